// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Counting semaphore used by every blocking IPC path.
//!
//! Two properties matter to callers beyond plain up/down:
//!
//! - [`Semaphore::down_unlocked`] releases an outer `parking_lot` guard and
//!   goes to sleep as one step with respect to anyone who signals while
//!   holding that same outer lock. Send and receive rely on this so a
//!   concurrent hang-up cannot slip between "drop the connection lock" and
//!   "sleep on the credit".
//! - [`Semaphore::wake_all`] kicks every current sleeper without granting a
//!   credit. Kicked sleepers report [`Wakeup::Woken`] and are expected to
//!   re-check whatever state made them sleep.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::interrupt::Interrupt;
use crate::timeout::{Deadline, Timeout};
use crate::SyncError;

/// How a successful `down` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// One credit was taken.
    Acquired,
    /// The sleeper was kicked by [`Semaphore::wake_all`]; no credit was taken.
    Woken,
}

/// Named counting semaphore.
pub struct Semaphore {
    core: Arc<SemaphoreCore>,
}

pub(crate) struct SemaphoreCore {
    name: &'static str,
    state: Mutex<SemState>,
    cond: Condvar,
}

struct SemState {
    count: usize,
    // Bumped by every wake_all; a sleeper that sees it move was kicked.
    epoch: u64,
    sleepers: usize,
}

impl SemaphoreCore {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Wakes sleepers so they re-evaluate their exit conditions.
    pub(crate) fn poke(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    fn sleep(self: &Arc<Self>, epoch: u64, deadline: Deadline) -> Result<Wakeup, SyncError> {
        let interrupt = Interrupt::current();
        let mut state = self.state.lock();
        let _armed = interrupt.arm(self);
        state.sleepers += 1;
        let result = loop {
            if state.count > 0 {
                state.count -= 1;
                break Ok(Wakeup::Acquired);
            }
            if state.epoch != epoch {
                break Ok(Wakeup::Woken);
            }
            if interrupt.take() {
                break Err(SyncError::Interrupted);
            }
            match deadline {
                Deadline::Now => break Err(SyncError::WouldBlock),
                Deadline::Never => self.cond.wait(&mut state),
                Deadline::At(at) => {
                    let timed_out = self.cond.wait_until(&mut state, at).timed_out();
                    if timed_out && state.count == 0 && state.epoch == epoch {
                        break Err(SyncError::TimedOut);
                    }
                }
            }
        };
        state.sleepers -= 1;
        result
    }
}

impl Semaphore {
    /// Creates a semaphore holding `initial` credits.
    pub fn new(name: &'static str, initial: usize) -> Self {
        Self {
            core: Arc::new(SemaphoreCore {
                name,
                state: Mutex::new(SemState { count: initial, epoch: 0, sleepers: 0 }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// Credits currently available.
    pub fn count(&self) -> usize {
        self.core.state.lock().count
    }

    /// Threads currently asleep on this semaphore.
    pub fn sleepers(&self) -> usize {
        self.core.state.lock().sleepers
    }

    /// Releases `n` credits.
    pub fn up(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut state = self.core.state.lock();
        state.count += n;
        self.core.cond.notify_all();
    }

    /// Takes one credit if available without sleeping.
    pub fn try_down(&self) -> bool {
        let mut state = self.core.state.lock();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Takes one credit, sleeping according to `timeout`.
    pub fn down(&self, timeout: Timeout) -> Result<Wakeup, SyncError> {
        let epoch = match self.fast_path(timeout)? {
            Ok(wakeup) => return Ok(wakeup),
            Err(epoch) => epoch,
        };
        self.core.sleep(epoch, timeout.deadline())
    }

    /// Takes one credit, releasing `guard` for the duration of the sleep.
    ///
    /// The guard is held again when this returns, whatever the outcome. Any
    /// [`Semaphore::up`] or [`Semaphore::wake_all`] performed by a thread
    /// holding the same outer lock after this call started is observed.
    pub fn down_unlocked<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Timeout,
    ) -> Result<Wakeup, SyncError> {
        let epoch = match self.fast_path(timeout)? {
            Ok(wakeup) => return Ok(wakeup),
            Err(epoch) => epoch,
        };
        let deadline = timeout.deadline();
        MutexGuard::unlocked(guard, || self.core.sleep(epoch, deadline))
    }

    /// Kicks every current sleeper without granting credits and returns how
    /// many were asleep.
    pub fn wake_all(&self) -> usize {
        let mut state = self.core.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        self.core.cond.notify_all();
        if state.sleepers > 0 {
            log::trace!(target: "sync", "{}: wake-all kicked {} sleeper(s)", self.core.name, state.sleepers);
        }
        state.sleepers
    }

    // Ok(Ok(_)) took a credit, Ok(Err(epoch)) must sleep from `epoch`.
    fn fast_path(&self, timeout: Timeout) -> Result<Result<Wakeup, u64>, SyncError> {
        let mut state = self.core.state.lock();
        if state.count > 0 {
            state.count -= 1;
            return Ok(Ok(Wakeup::Acquired));
        }
        if timeout.is_non_blocking() {
            return Err(SyncError::WouldBlock);
        }
        Ok(Err(state.epoch))
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("Semaphore")
            .field("name", &self.core.name)
            .field("count", &state.count)
            .field("sleepers", &state.sleepers)
            .finish()
    }
}
