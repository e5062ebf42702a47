// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-thread interruption token.
//!
//! Stands in for "a signal is pending on this thread". Any thread may raise
//! another thread's token; the target's current or next interruptible sleep
//! returns [`crate::SyncError::Interrupted`] and consumes the request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::semaphore::SemaphoreCore;

thread_local! {
    static CURRENT: Interrupt = Interrupt::new();
}

/// Handle to one thread's interruption state.
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

struct Inner {
    pending: AtomicBool,
    blocked_on: Mutex<Option<Arc<SemaphoreCore>>>,
}

impl Interrupt {
    fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: AtomicBool::new(false),
                blocked_on: Mutex::new(None),
            }),
        }
    }

    /// Token of the calling thread.
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// Requests interruption and wakes the thread if it is asleep.
    pub fn raise(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        let target = self.inner.blocked_on.lock().clone();
        if let Some(core) = target {
            log::trace!(target: "sync", "interrupting sleeper on {}", core.name());
            core.poke();
        }
    }

    /// Returns `true` while a raised interrupt has not been reported yet.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Drops a pending interrupt without reporting it.
    pub fn clear(&self) {
        self.inner.pending.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if both tokens belong to the same thread.
    pub fn same_thread(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::SeqCst)
    }

    // Called with the semaphore state lock held, before the pending check.
    pub(crate) fn arm(&self, core: &Arc<SemaphoreCore>) -> Armed<'_> {
        *self.inner.blocked_on.lock() = Some(Arc::clone(core));
        Armed { interrupt: self }
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt").field("pending", &self.is_pending()).finish()
    }
}

/// Clears the sleeping target when the sleep ends.
pub(crate) struct Armed<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        *self.interrupt.inner.blocked_on.lock() = None;
    }
}
