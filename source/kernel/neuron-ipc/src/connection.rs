// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Connections and their endpoints
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! PUBLIC API:
//!   - Connection: two endpoints, one lock, a rendezvous for connect
//!   - EndpointObject: handle-facing side with send/peek/receive
//!   - ConnPhase: lifecycle of a connection
//!
//! INVARIANTS:
//!   - One lock covers both endpoints and the port back-pointer
//!   - Lock order is port -> connection -> semaphore internals
//!   - Peer links are mutual until hang-up, then both are gone for good
//!   - After every wake-up the peer link is re-checked under the lock

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nexus_sync::{Semaphore, Timeout, Wakeup};
use parking_lot::{Mutex, MutexGuard};

use crate::endpoint::{EndpointCredits, EndpointInfo, EndpointState, Side};
use crate::error::{IpcError, Result};
use crate::message::{Message, MessageInfo, Received};
use crate::object::{
    Handle, KernelObject, ObjectType, WaitToken, CONNECTION_EVENT_HANGUP, CONNECTION_EVENT_MESSAGE,
};
use crate::port::Port;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection bounds copied from the IPC configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Messages an endpoint can queue.
    pub queue_depth: usize,
    /// Largest payload in bytes.
    pub message_max: usize,
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnPhase {
    /// Queued on a port, connector blocked.
    Connecting,
    /// Accepted by a listener.
    Accepted,
    /// Port went away or the connector gave up before acceptance.
    Rejected,
    /// One side has closed.
    Closing,
    /// Both sides have closed.
    Closed,
}

impl ConnPhase {
    /// Returns `true` if moving to `next` is a legal step.
    pub const fn can_transition_to(self, next: ConnPhase) -> bool {
        use ConnPhase::*;
        matches!(
            (self, next),
            (Connecting, Accepted)
                | (Connecting, Rejected)
                | (Connecting, Closed)
                | (Accepted, Closing)
                | (Accepted, Closed)
                | (Rejected, Closed)
                | (Closing, Closed)
        )
    }
}

pub(crate) struct ConnState {
    pub(crate) port: Option<Arc<Port>>,
    phase: ConnPhase,
    handles: usize,
    endpoints: [EndpointState; 2],
}

impl ConnState {
    pub(crate) fn set_phase(&mut self, next: ConnPhase) {
        debug_assert!(self.phase.can_transition_to(next), "connection phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Bidirectional channel between a server and a client endpoint.
pub struct Connection {
    id: u64,
    limits: Limits,
    state: Mutex<ConnState>,
    credits: [EndpointCredits; 2],
    rendezvous: Semaphore,
}

impl Connection {
    /// Allocates a connection with both endpoints linked to each other.
    pub(crate) fn new(limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            limits,
            state: Mutex::new(ConnState {
                port: None,
                phase: ConnPhase::Connecting,
                handles: 0,
                endpoints: [EndpointState::linked_to(Side::Client), EndpointState::linked_to(Side::Server)],
            }),
            credits: [
                EndpointCredits::with_capacity(limits.queue_depth),
                EndpointCredits::with_capacity(limits.queue_depth),
            ],
            rendezvous: Semaphore::new("connection_rendezvous", 0),
        })
    }

    /// Debug identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnPhase {
        self.state.lock().phase
    }

    /// Bounds this connection was created with.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock()
    }

    pub(crate) fn rendezvous(&self) -> &Semaphore {
        &self.rendezvous
    }

    /// Detaches `side` from its peer.
    fn hang_up_locked(&self, state: &mut ConnState, side: Side) {
        let Some(peer) = state.endpoints[side.index()].remote else {
            return;
        };
        // Peer senders sleep on our space, peer receivers on their data.
        self.credits[side.index()].space.wake_all();
        self.credits[peer.index()].data.wake_all();
        state.endpoints[peer.index()].hangup_notifier.run();
        state.endpoints[side.index()].remote = None;
        state.endpoints[peer.index()].remote = None;
    }

    /// Hangs up both ends at once, as when the port is destroyed.
    pub(crate) fn force_hang_up_locked(&self, state: &mut ConnState) {
        if state.endpoints[0].remote.is_none() {
            return;
        }
        for side in Side::BOTH {
            let credits = &self.credits[side.index()];
            credits.space.wake_all();
            credits.data.wake_all();
            let endpoint = &mut state.endpoints[side.index()];
            endpoint.hangup_notifier.run();
            endpoint.remote = None;
        }
        log::debug!(target: "ipc", "connection {}: forced hang-up", self.id);
    }

    // Drops unreceived messages as if they had been received.
    fn discard_queue_locked(&self, state: &mut ConnState, side: Side) {
        let credits = &self.credits[side.index()];
        let endpoint = &mut state.endpoints[side.index()];
        while endpoint.messages.pop_front().is_some() {
            assert!(credits.data.try_down(), "connection {}: queued message without data credit", self.id);
            credits.space.up(1);
        }
    }

    /// Close callback of an endpoint handle.
    fn close_endpoint(self: &Arc<Self>, side: Side) {
        let mut state = self.state.lock();
        self.hang_up_locked(&mut state, side);
        self.discard_queue_locked(&mut state, side);
        assert_eq!(self.credits[side.index()].data.count(), 0, "connection {}: stray data credit", self.id);
        debug_assert!(
            state.endpoints[side.index()].message_notifier.is_empty()
                && state.endpoints[side.index()].hangup_notifier.is_empty(),
            "waiter left registered on a closed endpoint"
        );
        state.handles -= 1;
        if state.handles > 0 {
            state.set_phase(ConnPhase::Closing);
            return;
        }
        state.set_phase(ConnPhase::Closed);
        let port = state.port.take();
        drop(state);
        if let Some(port) = port {
            port.detach_live(self);
        }
        log::debug!(target: "ipc", "connection {}: destroyed", self.id);
    }

    fn send(&self, side: Side, message: Message) -> Result<()> {
        let mut state = self.state.lock();
        let Some(peer) = state.endpoints[side.index()].remote else {
            return Err(IpcError::DestinationUnreachable);
        };
        let space = &self.credits[peer.index()].space;
        loop {
            let wakeup = space.down_unlocked(&mut state, Timeout::Blocking)?;
            if state.endpoints[side.index()].remote.is_none() {
                if wakeup == Wakeup::Acquired {
                    space.up(1);
                }
                return Err(IpcError::DestinationUnreachable);
            }
            if wakeup == Wakeup::Acquired {
                break;
            }
        }
        let target = &mut state.endpoints[peer.index()];
        target.messages.push_back(message);
        self.credits[peer.index()].data.up(1);
        target.message_notifier.run();
        Ok(())
    }

    /// Takes one data credit of `side`, re-checking the peer after every wake.
    ///
    /// Once the peer is gone this fails even if messages are still queued.
    fn wait_for_data(
        &self,
        state: &mut MutexGuard<'_, ConnState>,
        side: Side,
        timeout: Timeout,
    ) -> Result<()> {
        let data = &self.credits[side.index()].data;
        let deadline = timeout.deadline();
        let mut budget = timeout;
        loop {
            if state.endpoints[side.index()].remote.is_none() {
                return Err(IpcError::DestinationUnreachable);
            }
            let wakeup = data.down_unlocked(&mut *state, budget)?;
            if state.endpoints[side.index()].remote.is_none() {
                if wakeup == Wakeup::Acquired {
                    data.up(1);
                }
                return Err(IpcError::DestinationUnreachable);
            }
            if wakeup == Wakeup::Acquired {
                return Ok(());
            }
            budget = deadline.remaining();
        }
    }

    fn peek(&self, side: Side, timeout: Timeout) -> Result<MessageInfo> {
        let mut state = self.state.lock();
        self.wait_for_data(&mut state, side, timeout)?;
        let info = match state.endpoints[side.index()].messages.front() {
            Some(head) => head.info(),
            None => panic!("connection {}: data credit with empty queue", self.id),
        };
        self.credits[side.index()].data.up(1);
        Ok(info)
    }

    fn receive_with<R>(
        &self,
        side: Side,
        timeout: Timeout,
        deliver: impl FnOnce(&Message) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        self.wait_for_data(&mut state, side, timeout)?;
        let credits = &self.credits[side.index()];
        let queue = &mut state.endpoints[side.index()].messages;
        let Some(head) = queue.front() else {
            panic!("connection {}: data credit with empty queue", self.id);
        };
        match deliver(head) {
            Ok(out) => {
                queue.pop_front();
                credits.space.up(1);
                Ok(out)
            }
            Err(err) => {
                credits.data.up(1);
                Err(err)
            }
        }
    }

    fn begin_wait(&self, side: Side, token: &WaitToken) -> Result<()> {
        let mut state = self.state.lock();
        let endpoint = &mut state.endpoints[side.index()];
        match token.event() {
            CONNECTION_EVENT_HANGUP => {
                if endpoint.remote.is_none() {
                    token.fire();
                } else {
                    endpoint.hangup_notifier.register(token.subscription());
                }
            }
            CONNECTION_EVENT_MESSAGE => {
                if self.credits[side.index()].data.count() > 0 {
                    token.fire();
                } else {
                    endpoint.message_notifier.register(token.subscription());
                }
            }
            _ => return Err(IpcError::InvalidArgument),
        }
        Ok(())
    }

    fn end_wait(&self, side: Side, token: &WaitToken) {
        let mut state = self.state.lock();
        let endpoint = &mut state.endpoints[side.index()];
        match token.event() {
            CONNECTION_EVENT_HANGUP => {
                endpoint.hangup_notifier.unregister(token.key());
            }
            CONNECTION_EVENT_MESSAGE => {
                endpoint.message_notifier.unregister(token.key());
            }
            _ => {}
        }
    }

    fn info_locked(&self, state: &ConnState, side: Side) -> EndpointInfo {
        let endpoint = &state.endpoints[side.index()];
        let credits = &self.credits[side.index()];
        EndpointInfo {
            connection: self.id,
            side,
            queued: endpoint.messages.len(),
            space: credits.space.count(),
            data: credits.data.count(),
            attached: endpoint.remote.is_some(),
            waiters: endpoint.message_notifier.len() + endpoint.hangup_notifier.len(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("phase", &state.phase)
            .field("handles", &state.handles)
            .field("port", &state.port.as_ref().map(|p| p.id()))
            .finish()
    }
}

/// The object behind a connection handle: one side of a [`Connection`].
pub struct EndpointObject {
    conn: Arc<Connection>,
    side: Side,
}

impl EndpointObject {
    /// Counts a new handle on `side` while the caller holds the connection lock.
    pub(crate) fn attach_locked(conn: &Arc<Connection>, state: &mut ConnState, side: Side) -> Self {
        state.handles += 1;
        Self { conn: Arc::clone(conn), side }
    }

    pub(crate) fn attach(conn: &Arc<Connection>, side: Side) -> Self {
        let mut state = conn.lock();
        Self::attach_locked(conn, &mut state, side)
    }

    /// Which end this handle refers to.
    pub fn side(&self) -> Side {
        self.side
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Queues a copy of `data` on the peer, blocking while its queue is full.
    pub fn send(&self, ty: u32, data: &[u8]) -> Result<()> {
        if data.len() > self.conn.limits.message_max {
            return Err(IpcError::InvalidArgument);
        }
        self.conn.send(self.side, Message::new(ty, data))
    }

    /// Queues an already copied message.
    pub fn send_message(&self, message: Message) -> Result<()> {
        if message.len() > self.conn.limits.message_max {
            return Err(IpcError::InvalidArgument);
        }
        self.conn.send(self.side, message)
    }

    /// Atomic batch send. Not implemented: how a batch that only partly fits
    /// the peer queue should behave is undefined.
    pub fn send_vector(&self, batch: &[Message]) -> Result<()> {
        let _ = batch;
        Err(IpcError::NotSupported)
    }

    /// Type and size of the head message, leaving it queued.
    pub fn peek(&self, timeout: Timeout) -> Result<MessageInfo> {
        self.conn.peek(self.side, timeout)
    }

    /// Receives the head message into `buf`, truncating if `buf` is short.
    ///
    /// A zero-length buffer discards the message.
    pub fn receive(&self, timeout: Timeout, buf: &mut [u8]) -> Result<Received> {
        self.conn.receive_with(self.side, timeout, |msg| {
            Ok(Received { ty: msg.ty(), size: msg.len(), copied: msg.copy_to(buf) })
        })
    }

    /// Hands the head message to `deliver`; it is consumed only if `deliver`
    /// succeeds.
    pub fn receive_with<R>(
        &self,
        timeout: Timeout,
        deliver: impl FnOnce(&Message) -> Result<R>,
    ) -> Result<R> {
        self.conn.receive_with(self.side, timeout, deliver)
    }

    /// Returns `true` once the peer is gone.
    pub fn is_hung_up(&self) -> bool {
        self.conn.lock().endpoints[self.side.index()].remote.is_none()
    }

    /// Debug snapshot.
    pub fn info(&self) -> EndpointInfo {
        let state = self.conn.lock();
        self.conn.info_locked(&state, self.side)
    }
}

impl KernelObject for EndpointObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Connection
    }

    fn begin_wait(&self, token: &WaitToken) -> Result<()> {
        self.conn.begin_wait(self.side, token)
    }

    fn end_wait(&self, token: &WaitToken) {
        self.conn.end_wait(self.side, token);
    }

    fn close(&self) {
        self.conn.close_endpoint(self.side);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Handle {
    /// The endpoint behind a connection handle.
    pub fn endpoint(&self) -> Result<&EndpointObject> {
        self.downcast::<EndpointObject>().ok_or(IpcError::InvalidHandleType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: Limits = Limits { queue_depth: 2, message_max: 64 };

    // A connection with both ends attached but no port, as after accept.
    fn linked() -> (Handle, Handle) {
        let conn = Connection::new(LIMITS);
        let server = Handle::new(EndpointObject::attach(&conn, Side::Server));
        let client = Handle::new(EndpointObject::attach(&conn, Side::Client));
        conn.lock().set_phase(ConnPhase::Accepted);
        (server, client)
    }

    #[test]
    fn phases_only_move_forward() {
        assert!(ConnPhase::Connecting.can_transition_to(ConnPhase::Accepted));
        assert!(ConnPhase::Closing.can_transition_to(ConnPhase::Closed));
        assert!(!ConnPhase::Closed.can_transition_to(ConnPhase::Accepted));
        assert!(!ConnPhase::Rejected.can_transition_to(ConnPhase::Accepted));
    }

    #[test]
    fn credits_track_queue() {
        let (server, client) = linked();
        server.endpoint().unwrap().send(1, b"a").unwrap();
        let info = client.endpoint().unwrap().info();
        assert_eq!((info.queued, info.space, info.data), (1, 1, 1));

        client.endpoint().unwrap().peek(Timeout::NonBlocking).unwrap();
        assert_eq!(client.endpoint().unwrap().info().data, 1);

        let mut buf = [0u8; 4];
        client.endpoint().unwrap().receive(Timeout::NonBlocking, &mut buf).unwrap();
        let info = client.endpoint().unwrap().info();
        assert_eq!((info.queued, info.space, info.data), (0, 2, 0));
    }

    #[test]
    fn failed_delivery_keeps_message() {
        let (server, client) = linked();
        server.endpoint().unwrap().send(9, b"keep").unwrap();
        let ep = client.endpoint().unwrap();
        let res: Result<()> = ep.receive_with(Timeout::NonBlocking, |_| Err(IpcError::BadAddress));
        assert_eq!(res, Err(IpcError::BadAddress));
        assert_eq!(ep.peek(Timeout::NonBlocking).unwrap(), MessageInfo { ty: 9, size: 4 });
    }

    #[test]
    fn closing_one_side_hangs_up_both() {
        let (server, client) = linked();
        client.endpoint().unwrap().send(1, b"x").unwrap();
        let conn = Arc::clone(server.endpoint().unwrap().connection());
        drop(server);
        assert_eq!(conn.phase(), ConnPhase::Closing);
        let ep = client.endpoint().unwrap();
        assert!(ep.is_hung_up());
        assert_eq!(ep.send(1, b"y"), Err(IpcError::DestinationUnreachable));
        drop(client);
        assert_eq!(conn.phase(), ConnPhase::Closed);
    }

    #[test]
    fn oversize_and_batch_sends_are_rejected() {
        let (server, _client) = linked();
        let ep = server.endpoint().unwrap();
        assert_eq!(ep.send(0, &[0u8; 65]), Err(IpcError::InvalidArgument));
        assert_eq!(ep.send_vector(&[Message::new(0, vec![1])]), Err(IpcError::NotSupported));
    }
}
