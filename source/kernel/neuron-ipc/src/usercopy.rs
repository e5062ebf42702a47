// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Copies across the user/kernel boundary.
//!
//! The IPC core only ever touches user memory through [`UserMemory`]. The
//! kernel backs it with its fault-checked copy helpers; [`HostMemory`] is a
//! flat arena used by host builds and tests.

use parking_lot::Mutex;

use crate::error::{IpcError, Result};

/// Address in the calling process. Zero is the null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserAddr(pub usize);

impl UserAddr {
    /// Null user pointer.
    pub const NULL: Self = Self(0);

    /// Returns `true` for the null pointer.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` further on, if it does not wrap.
    pub fn offset(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// Fault-checked access to a process's memory.
///
/// Zero-length copies succeed for any address.
pub trait UserMemory: Send + Sync {
    /// Fills `dst` from user memory at `src`.
    fn copy_in(&self, dst: &mut [u8], src: UserAddr) -> Result<()>;

    /// Writes `src` to user memory at `dst`.
    fn copy_out(&self, dst: UserAddr, src: &[u8]) -> Result<()>;

    /// Reads `count` little-endian `u32`s starting at `src`.
    fn read_u32_array(&self, src: UserAddr, count: usize) -> Result<Vec<u32>> {
        let len = count.checked_mul(4).ok_or(IpcError::InvalidArgument)?;
        let mut raw = vec![0u8; len];
        self.copy_in(&mut raw, src)?;
        Ok(raw.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
    }
}

/// Base address of a [`HostMemory`] arena; everything below faults.
pub const HOST_MEMORY_BASE: usize = 0x1000;

/// Flat, bounds-checked user address space.
pub struct HostMemory {
    bytes: Mutex<Vec<u8>>,
}

impl HostMemory {
    /// Arena of `size` zeroed bytes starting at [`HOST_MEMORY_BASE`].
    pub fn new(size: usize) -> Self {
        Self { bytes: Mutex::new(vec![0; size]) }
    }

    /// First valid address.
    pub fn base(&self) -> UserAddr {
        UserAddr(HOST_MEMORY_BASE)
    }

    fn range(&self, addr: UserAddr, len: usize, size: usize) -> Result<std::ops::Range<usize>> {
        let start = addr.0.checked_sub(HOST_MEMORY_BASE).ok_or(IpcError::BadAddress)?;
        let end = start.checked_add(len).ok_or(IpcError::BadAddress)?;
        if end > size {
            return Err(IpcError::BadAddress);
        }
        Ok(start..end)
    }
}

impl UserMemory for HostMemory {
    fn copy_in(&self, dst: &mut [u8], src: UserAddr) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        let bytes = self.bytes.lock();
        let range = self.range(src, dst.len(), bytes.len())?;
        dst.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn copy_out(&self, dst: UserAddr, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let mut bytes = self.bytes.lock();
        let size = bytes.len();
        let range = self.range(dst, src.len(), size)?;
        bytes[range].copy_from_slice(src);
        Ok(())
    }
}
