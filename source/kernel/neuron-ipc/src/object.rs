// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel object model and the object wait contract
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! PUBLIC API:
//!   - KernelObject: close/begin_wait/end_wait implemented per object type
//!   - Handle: shared reference to one opened object
//!   - WaitToken: one registration of a waiter on one object event
//!
//! INVARIANTS:
//!   - begin_wait either fires the token, registers it, or fails with no side effects
//!   - end_wait is idempotent and safe after the token fired
//!   - close runs exactly once, when the last clone of a Handle is dropped

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use nexus_sync::{Subscription, WaitSync};

use crate::error::{IpcError, Result};

/// Port event: a connection attempt is waiting to be accepted.
pub const PORT_EVENT_CONNECTION: u32 = 0;
/// Connection event: the peer hung up.
pub const CONNECTION_EVENT_HANGUP: u32 = 0;
/// Connection event: a message is queued for this endpoint.
pub const CONNECTION_EVENT_MESSAGE: u32 = 1;

/// Kind of object behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// IPC port.
    Port,
    /// One endpoint of an IPC connection.
    Connection,
    /// Object type owned by another subsystem, identified by number.
    Other(u32),
}

/// One waiter's registration for one event on one object.
#[derive(Debug)]
pub struct WaitToken {
    event: u32,
    subscription: Subscription,
}

impl WaitToken {
    /// Token reporting `index` to `sync` when `event` fires.
    pub fn new(sync: &Arc<WaitSync>, event: u32, index: usize) -> Self {
        Self { event, subscription: Subscription::new(sync, index) }
    }

    /// Event the waiter is interested in.
    pub fn event(&self) -> u32 {
        self.event
    }

    /// Stable key identifying this registration in notifier lists.
    pub fn key(&self) -> u64 {
        self.subscription.key()
    }

    /// Position of the object in the waiter's array.
    pub fn index(&self) -> usize {
        self.subscription.index()
    }

    /// Delivers the event now. Never blocks.
    pub fn fire(&self) {
        self.subscription.fire();
    }

    /// Subscription to place on the object's notifier list.
    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }
}

/// Behaviour every object reachable through a handle provides.
pub trait KernelObject: Send + Sync + 'static {
    /// Type tag used by typed handle lookups.
    fn object_type(&self) -> ObjectType;

    /// Starts waiting for `token.event()`.
    ///
    /// Fires the token synchronously if the event already holds, otherwise
    /// registers it. Unknown events fail with [`IpcError::InvalidArgument`].
    fn begin_wait(&self, token: &WaitToken) -> Result<()> {
        let _ = token;
        Err(IpcError::InvalidArgument)
    }

    /// Removes `token` from wherever `begin_wait` placed it.
    fn end_wait(&self, token: &WaitToken) {
        let _ = token;
    }

    /// Called once when the last reference to the handle goes away.
    fn close(&self) {}

    /// Downcast support for typed accessors.
    fn as_any(&self) -> &dyn Any;
}

struct HandleEntry {
    object: Box<dyn KernelObject>,
}

impl Drop for HandleEntry {
    fn drop(&mut self) {
        self.object.close();
    }
}

/// Shared reference to an opened kernel object.
///
/// Clones (duplicated table entries, in-flight operations) share one
/// reference; the object's close callback runs when the last clone drops.
#[derive(Clone)]
pub struct Handle(Arc<HandleEntry>);

impl Handle {
    /// Opens a new reference to `object`.
    pub fn new<O: KernelObject>(object: O) -> Self {
        Self(Arc::new(HandleEntry { object: Box::new(object) }))
    }

    /// The object behind the handle.
    pub fn object(&self) -> &dyn KernelObject {
        self.0.object.as_ref()
    }

    /// Type of the object behind the handle.
    pub fn object_type(&self) -> ObjectType {
        self.0.object.object_type()
    }

    /// Concrete object, if it is an `O`.
    pub fn downcast<O: KernelObject>(&self) -> Option<&O> {
        self.0.object.as_any().downcast_ref::<O>()
    }

    /// Returns `true` if both handles share one reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live clones of this reference.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &self.object_type())
            .field("references", &self.references())
            .finish()
    }
}
