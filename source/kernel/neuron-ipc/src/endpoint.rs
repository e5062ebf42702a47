// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! One side of a connection.
//!
//! The queue, the peer link and the notifier lists live in
//! [`EndpointState`] under the owning connection's lock. The credit
//! semaphores live outside it in [`EndpointCredits`] so senders and
//! receivers can sleep on them after dropping that lock.
//!
//! Credit accounting per endpoint: `data` equals the number of queued
//! messages and `space + data == capacity`, except while a sender or
//! receiver holds a credit it took but has not yet settled.

use std::collections::VecDeque;
use std::fmt;

use nexus_sync::{Notifier, Semaphore};

use crate::message::Message;

/// Which end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Endpoint handed to the listener.
    Server,
    /// Endpoint handed to the connector.
    Client,
}

impl Side {
    /// Both sides, server first.
    pub const BOTH: [Side; 2] = [Side::Server, Side::Client];

    /// Slot of this side in per-connection arrays.
    pub const fn index(self) -> usize {
        match self {
            Side::Server => 0,
            Side::Client => 1,
        }
    }

    /// The opposite side.
    pub const fn peer(self) -> Side {
        match self {
            Side::Server => Side::Client,
            Side::Client => Side::Server,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Server => "server",
            Side::Client => "client",
        })
    }
}

pub(crate) struct EndpointState {
    pub(crate) messages: VecDeque<Message>,
    // Peer link; never owning. `None` once hung up, and it stays that way.
    pub(crate) remote: Option<Side>,
    pub(crate) message_notifier: Notifier,
    pub(crate) hangup_notifier: Notifier,
}

impl EndpointState {
    pub(crate) fn linked_to(remote: Side) -> Self {
        Self {
            messages: VecDeque::new(),
            remote: Some(remote),
            message_notifier: Notifier::new(),
            hangup_notifier: Notifier::new(),
        }
    }
}

pub(crate) struct EndpointCredits {
    pub(crate) space: Semaphore,
    pub(crate) data: Semaphore,
}

impl EndpointCredits {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { space: Semaphore::new("endpoint_space", capacity), data: Semaphore::new("endpoint_data", 0) }
    }
}

/// Debug snapshot of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Connection the endpoint belongs to.
    pub connection: u64,
    /// Which end.
    pub side: Side,
    /// Messages waiting to be received.
    pub queued: usize,
    /// Free queue slots.
    pub space: usize,
    /// Data credits.
    pub data: usize,
    /// Whether the peer is still attached.
    pub attached: bool,
    /// Registered message and hang-up waiters.
    pub waiters: usize,
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conn {:<6} {:<6} queued {:<4} space {:<4} data {:<4} waiters {:<3} {}",
            self.connection,
            self.side,
            self.queued,
            self.space,
            self.data,
            self.waiters,
            if self.attached { "attached" } else { "hung-up" }
        )
    }
}
