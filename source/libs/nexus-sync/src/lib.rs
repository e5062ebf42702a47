// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Blocking primitives shared by the kernel IPC core and object waits
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests per module, tests/semaphore.rs, tests/wait_sync.rs
//!
//! PUBLIC API:
//!   - Timeout / Deadline: caller supplied wait budgets
//!   - Semaphore: counting semaphore with indivisible unlock-then-sleep
//!   - Interrupt: per-thread interruption token
//!   - WaitSync: semaphore plus first-event cell shared by multi-object waits
//!   - Notifier / Subscription: keyed observer lists owned by waitable objects
//!   - SyncError: status of a blocking operation that did not complete
//!
//! DEPENDS_ON:
//!   - parking_lot: mutex/condvar backing every sleeping primitive
//!   - log: trace output for wake-all kicks and interrupts
//!   - thiserror: SyncError
//!
//! INVARIANTS:
//!   - Semaphore internal locks are always the innermost lock taken
//!   - A raised interrupt is reported by exactly one interruptible sleep

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod interrupt;
mod notifier;
mod semaphore;
mod timeout;
mod wait_sync;

pub use interrupt::Interrupt;
pub use notifier::{Notifier, Subscription};
pub use semaphore::{Semaphore, Wakeup};
pub use timeout::{Deadline, Timeout};
pub use wait_sync::WaitSync;

/// Reason a blocking operation returned without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The caller asked not to block and the operation could not proceed.
    #[error("operation would block")]
    WouldBlock,
    /// The bounded wait expired.
    #[error("wait timed out")]
    TimedOut,
    /// The waiting thread was interrupted.
    #[error("wait interrupted")]
    Interrupted,
}
