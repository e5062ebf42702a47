// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Messages queued on endpoints.

/// Type tag and payload copied in by `send`. The kernel never interprets
/// the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    ty: u32,
    data: Box<[u8]>,
}

impl Message {
    /// Wraps an already copied payload.
    pub fn new(ty: u32, data: impl Into<Box<[u8]>>) -> Self {
        Self { ty, data: data.into() }
    }

    /// Caller-defined type tag.
    pub fn ty(&self) -> u32 {
        self.ty
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Type and size, as reported by peek.
    pub fn info(&self) -> MessageInfo {
        MessageInfo { ty: self.ty, size: self.data.len() }
    }

    /// Copies as much of the payload as fits into `buf`; the rest is dropped.
    pub fn copy_to(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        n
    }
}

/// Result of a peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    /// Type tag.
    pub ty: u32,
    /// Full payload size.
    pub size: usize,
}

/// Result of a receive into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Type tag.
    pub ty: u32,
    /// Full payload size of the consumed message.
    pub size: usize,
    /// Bytes actually copied into the buffer.
    pub copied: usize,
}
