// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wait-sync: the rendezvous between a blocked waiter and whichever
//! registered event fires first.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::semaphore::Semaphore;
use crate::timeout::Timeout;
use crate::SyncError;

const NO_EVENT: usize = usize::MAX;

/// Semaphore with count 0 plus a single "first event" cell.
#[derive(Debug)]
pub struct WaitSync {
    sem: Semaphore,
    first: AtomicUsize,
}

impl WaitSync {
    /// Creates an unsignalled wait-sync.
    pub fn new() -> Arc<Self> {
        Arc::new(Self { sem: Semaphore::new("wait_sync", 0), first: AtomicUsize::new(NO_EVENT) })
    }

    /// Records `index` if no event was recorded yet, then releases the waiter.
    ///
    /// Safe to call from any context that may not block.
    pub fn signal(&self, index: usize) {
        debug_assert_ne!(index, NO_EVENT);
        let _ = self.first.compare_exchange(NO_EVENT, index, Ordering::AcqRel, Ordering::Acquire);
        self.sem.up(1);
    }

    /// Index of the first event to fire, if any fired.
    pub fn first_event(&self) -> Option<usize> {
        match self.first.load(Ordering::Acquire) {
            NO_EVENT => None,
            index => Some(index),
        }
    }

    /// Blocks until an event fires and returns the first recorded index.
    pub fn wait(&self, timeout: Timeout) -> Result<usize, SyncError> {
        self.sem.down(timeout)?;
        match self.first_event() {
            Some(index) => Ok(index),
            None => unreachable!("wait-sync released without a recorded event"),
        }
    }
}
