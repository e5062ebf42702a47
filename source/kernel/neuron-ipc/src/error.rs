// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Status taxonomy reported by every IPC operation.

use nexus_sync::SyncError;

/// Result alias used throughout the IPC core.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Error returned by IPC and object wait operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Unknown port id or handle.
    #[error("object not found")]
    NotFound,
    /// Port-id arena or handle table is full.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// Bad event id, oversize payload, bad wait count or null buffer.
    #[error("invalid argument")]
    InvalidArgument,
    /// The peer hung up or the port went away.
    #[error("destination unreachable")]
    DestinationUnreachable,
    /// Bounded wait expired.
    #[error("operation timed out")]
    TimedOut,
    /// Non-blocking attempt could not make progress.
    #[error("operation would block")]
    WouldBlock,
    /// The calling thread was interrupted while blocked.
    #[error("operation interrupted")]
    Interrupted,
    /// Entry point exists but is not implemented.
    #[error("operation not supported")]
    NotSupported,
    /// Handle exists but refers to another object type.
    #[error("handle refers to a different object type")]
    InvalidHandleType,
    /// User memory copy faulted.
    #[error("bad user address")]
    BadAddress,
}

impl IpcError {
    /// Negative status number reported at the syscall boundary.
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => -1,
            Self::ResourceExhausted => -2,
            Self::InvalidArgument => -3,
            Self::DestinationUnreachable => -4,
            Self::TimedOut => -5,
            Self::WouldBlock => -6,
            Self::Interrupted => -7,
            Self::NotSupported => -8,
            Self::InvalidHandleType => -9,
            Self::BadAddress => -10,
        }
    }
}

impl From<SyncError> for IpcError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::WouldBlock => Self::WouldBlock,
            SyncError::TimedOut => Self::TimedOut,
            SyncError::Interrupted => Self::Interrupted,
        }
    }
}

/// Collapses a result into the status number seen by user space.
pub fn status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_negative() {
        let all = [
            IpcError::NotFound,
            IpcError::ResourceExhausted,
            IpcError::InvalidArgument,
            IpcError::DestinationUnreachable,
            IpcError::TimedOut,
            IpcError::WouldBlock,
            IpcError::Interrupted,
            IpcError::NotSupported,
            IpcError::InvalidHandleType,
            IpcError::BadAddress,
        ];
        let mut codes: Vec<i32> = all.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn sync_errors_map_one_to_one() {
        assert_eq!(IpcError::from(SyncError::TimedOut), IpcError::TimedOut);
        assert_eq!(IpcError::from(SyncError::WouldBlock), IpcError::WouldBlock);
        assert_eq!(IpcError::from(SyncError::Interrupted), IpcError::Interrupted);
        assert_eq!(status::<()>(&Err(IpcError::NotFound)), -1);
        assert_eq!(status(&Ok(5)), 0);
    }
}
