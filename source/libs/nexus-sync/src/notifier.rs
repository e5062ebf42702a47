// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Observer lists owned by waitable objects.
//!
//! A [`Notifier`] lives inside the owning object's locked state. Waiters add a
//! [`Subscription`] on `begin_wait` and remove it by key on `end_wait`; the
//! object calls [`Notifier::run`] when the event happens. Subscriptions hold
//! a strong reference to their [`WaitSync`], so a stale entry can never point
//! at freed waiter state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::wait_sync::WaitSync;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// One waiter's interest in one event.
#[derive(Clone)]
pub struct Subscription {
    key: u64,
    index: usize,
    sync: Arc<WaitSync>,
}

impl Subscription {
    /// Subscribes `sync`, reporting `index` when fired.
    pub fn new(sync: &Arc<WaitSync>, index: usize) -> Self {
        Self { key: NEXT_KEY.fetch_add(1, Ordering::Relaxed), index, sync: Arc::clone(sync) }
    }

    /// Stable key used for removal.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Index reported to the waiter.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Delivers the event. Never blocks.
    pub fn fire(&self) {
        self.sync.signal(self.index);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).field("index", &self.index).finish()
    }
}

/// Keyed list of subscriptions to a single event.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<Subscription>,
}

impl Notifier {
    /// Empty list.
    pub const fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    /// Adds `sub`; registering an already present key is a no-op.
    pub fn register(&mut self, sub: Subscription) {
        if self.subscribers.iter().any(|s| s.key == sub.key) {
            return;
        }
        self.subscribers.push(sub);
    }

    /// Removes the subscription with `key`. Returns `false` if absent.
    pub fn unregister(&mut self, key: u64) -> bool {
        match self.subscribers.iter().position(|s| s.key == key) {
            Some(pos) => {
                self.subscribers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Fires every subscriber, keeping them registered. Returns how many fired.
    pub fn run(&self) -> usize {
        for sub in &self.subscribers {
            sub.fire();
        }
        self.subscribers.len()
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
