// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wait budgets accepted by every blocking call.

use std::time::{Duration, Instant};

/// How long a blocking call may sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Return immediately if the operation cannot proceed.
    NonBlocking,
    /// Sleep until the operation proceeds or the thread is interrupted.
    #[default]
    Blocking,
    /// Sleep for at most the given duration.
    After(Duration),
}

impl Timeout {
    /// Decodes the syscall convention: negative blocks forever, zero polls,
    /// positive values are a budget in microseconds.
    pub const fn from_micros(us: i64) -> Self {
        if us < 0 {
            Self::Blocking
        } else if us == 0 {
            Self::NonBlocking
        } else {
            Self::After(Duration::from_micros(us as u64))
        }
    }

    /// Returns `true` if the caller asked not to sleep.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts the relative budget into an absolute deadline starting now.
    pub fn deadline(self) -> Deadline {
        match self {
            Self::NonBlocking => Deadline::Now,
            Self::Blocking => Deadline::Never,
            Self::After(d) => match Instant::now().checked_add(d) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
        }
    }
}

/// Absolute form of a [`Timeout`], used by retry loops that must not
/// restart the caller's budget on every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Poll only.
    Now,
    /// No deadline.
    Never,
    /// Expires at the given instant.
    At(Instant),
}

impl Deadline {
    /// Budget left before the deadline, as a relative [`Timeout`].
    ///
    /// An expired bounded deadline becomes a zero budget: the final attempt
    /// still takes state that became ready at the last moment, and otherwise
    /// fails with `TimedOut` rather than `WouldBlock`.
    pub fn remaining(self) -> Timeout {
        match self {
            Self::Now => Timeout::NonBlocking,
            Self::Never => Timeout::Blocking,
            Self::At(at) => Timeout::After(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Returns `true` once a bounded deadline has passed.
    pub fn expired(self) -> bool {
        match self {
            Self::Now => true,
            Self::Never => false,
            Self::At(at) => Instant::now() >= at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_encoding() {
        assert_eq!(Timeout::from_micros(-1), Timeout::Blocking);
        assert_eq!(Timeout::from_micros(i64::MIN), Timeout::Blocking);
        assert_eq!(Timeout::from_micros(0), Timeout::NonBlocking);
        assert_eq!(Timeout::from_micros(1500), Timeout::After(Duration::from_micros(1500)));
    }

    #[test]
    fn deadline_remaining_shrinks_and_expires() {
        let deadline = Timeout::After(Duration::from_millis(20)).deadline();
        match deadline.remaining() {
            Timeout::After(left) => assert!(left <= Duration::from_millis(20)),
            other => panic!("unexpected budget {other:?}"),
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Timeout::After(Duration::ZERO));
    }

    #[test]
    fn unbounded_deadlines() {
        assert_eq!(Timeout::Blocking.deadline().remaining(), Timeout::Blocking);
        assert!(!Timeout::Blocking.deadline().expired());
        assert_eq!(Timeout::NonBlocking.deadline().remaining(), Timeout::NonBlocking);
    }
}
