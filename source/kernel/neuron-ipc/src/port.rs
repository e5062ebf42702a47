// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ports: rendezvous points connectors reach by numeric id.
//!
//! A port keeps the connections still waiting for a listener (`pending`,
//! mirrored by `conn_sem`) and the accepted ones (`live`) so it can force
//! them apart when it is destroyed. A connection is in at most one of the
//! two lists; list membership and the connection's back-pointer change
//! together under the port lock.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use nexus_sync::{Notifier, Semaphore, Timeout};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::connection::{ConnPhase, Connection, EndpointObject, Limits};
use crate::endpoint::Side;
use crate::error::{IpcError, Result};
use crate::object::{Handle, KernelObject, ObjectType, WaitToken, PORT_EVENT_CONNECTION};
use crate::registry::Registry;

/// Process-wide port identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct PortState {
    alive: bool,
    pending: VecDeque<Arc<Connection>>,
    live: Vec<Arc<Connection>>,
    notifier: Notifier,
}

/// Kernel port object.
pub struct Port {
    id: PortId,
    limits: Limits,
    state: Mutex<PortState>,
    conn_sem: Semaphore,
}

impl Port {
    pub(crate) fn new(id: PortId, limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            id,
            limits,
            state: Mutex::new(PortState {
                alive: true,
                pending: VecDeque::new(),
                live: Vec::new(),
                notifier: Notifier::new(),
            }),
            conn_sem: Semaphore::new("port_connections", 0),
        })
    }

    /// Numeric identity.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Bounds given to connections made through this port.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Returns `false` once the last port handle has been closed.
    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Accepts one pending connection and returns the server end.
    pub(crate) fn listen(self: &Arc<Self>, timeout: Timeout) -> Result<Handle> {
        let deadline = timeout.deadline();
        let mut budget = timeout;
        loop {
            self.conn_sem.down(budget)?;
            let mut state = self.state.lock();
            // The caller's handle keeps the port registered for the whole call.
            debug_assert!(state.alive, "port {}: listen after destroy", self.id);
            if let Some(conn) = state.pending.pop_front() {
                let server = {
                    let mut cs = conn.lock();
                    cs.port = Some(Arc::clone(self));
                    cs.set_phase(ConnPhase::Accepted);
                    EndpointObject::attach_locked(&conn, &mut cs, Side::Server)
                };
                state.live.push(Arc::clone(&conn));
                conn.rendezvous().up(1);
                log::debug!(target: "ipc", "port {}: accepted connection {}", self.id, conn.id());
                return Ok(Handle::new(server));
            }
            // The credit belonged to a connector that gave up; retry within budget.
            drop(state);
            budget = deadline.remaining();
        }
    }

    /// Queues `conn` for a listener and wakes one.
    pub(crate) fn enqueue(self: &Arc<Self>, conn: &Arc<Connection>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(IpcError::DestinationUnreachable);
        }
        conn.lock().port = Some(Arc::clone(self));
        state.pending.push_back(Arc::clone(conn));
        self.conn_sem.up(1);
        state.notifier.run();
        Ok(())
    }

    /// Withdraws a connector that stopped waiting. Returns `false` if a
    /// listener or the port teardown already took it off the pending list.
    pub(crate) fn abandon(&self, conn: &Arc<Connection>) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.pending.iter().position(|c| Arc::ptr_eq(c, conn)) else {
            return false;
        };
        state.pending.remove(pos);
        // May fail if a listener already took the credit; it will retry.
        self.conn_sem.try_down();
        let mut cs = conn.lock();
        cs.port = None;
        cs.set_phase(ConnPhase::Rejected);
        true
    }

    /// Forgets a live connection whose last handle closed.
    pub(crate) fn detach_live(&self, conn: &Arc<Connection>) {
        let mut state = self.state.lock();
        state.live.retain(|c| !Arc::ptr_eq(c, conn));
    }

    /// Fails every pending connector and hangs up every live connection.
    pub(crate) fn destroy(&self) {
        let mut state = self.state.lock();
        state.alive = false;
        let rejected = state.pending.len();
        for conn in state.pending.drain(..) {
            {
                let mut cs = conn.lock();
                cs.port = None;
                cs.set_phase(ConnPhase::Rejected);
            }
            conn.rendezvous().up(1);
        }
        while self.conn_sem.try_down() {}
        let detached = state.live.len();
        for conn in state.live.drain(..) {
            let mut cs = conn.lock();
            conn.force_hang_up_locked(&mut cs);
            cs.port = None;
        }
        log::debug!(
            target: "ipc",
            "port {}: destroyed, {} pending rejected, {} live detached",
            self.id,
            rejected,
            detached
        );
    }

    fn begin_wait(&self, token: &WaitToken) -> Result<()> {
        if token.event() != PORT_EVENT_CONNECTION {
            return Err(IpcError::InvalidArgument);
        }
        let mut state = self.state.lock();
        if self.conn_sem.count() > 0 {
            token.fire();
        } else {
            state.notifier.register(token.subscription());
        }
        Ok(())
    }

    fn end_wait(&self, token: &WaitToken) {
        if token.event() == PORT_EVENT_CONNECTION {
            self.state.lock().notifier.unregister(token.key());
        }
    }

    pub(crate) fn info(&self, handles: usize) -> PortInfo {
        let state = self.state.lock();
        PortInfo {
            id: self.id,
            handles,
            pending: state.pending.len(),
            live: state.live.len(),
            backlog: self.conn_sem.count(),
            waiters: state.notifier.len(),
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port").field("id", &self.id).finish_non_exhaustive()
    }
}

/// The object behind a port handle.
pub struct PortObject {
    port: Arc<Port>,
    registry: Arc<Registry>,
}

impl PortObject {
    pub(crate) fn new(port: Arc<Port>, registry: Arc<Registry>) -> Self {
        Self { port, registry }
    }

    /// Numeric identity of the port.
    pub fn id(&self) -> PortId {
        self.port.id
    }

    /// The port itself.
    pub fn port(&self) -> &Arc<Port> {
        &self.port
    }

    /// Blocks until a connector arrives, accepts it and returns the server
    /// end of the new connection.
    pub fn listen(&self, timeout: Timeout) -> Result<Handle> {
        self.port.listen(timeout)
    }
}

impl KernelObject for PortObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Port
    }

    fn begin_wait(&self, token: &WaitToken) -> Result<()> {
        self.port.begin_wait(token)
    }

    fn end_wait(&self, token: &WaitToken) {
        self.port.end_wait(token);
    }

    fn close(&self) {
        self.registry.release(&self.port);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Handle {
    /// The port behind a port handle.
    pub fn port(&self) -> Result<&PortObject> {
        self.downcast::<PortObject>().ok_or(IpcError::InvalidHandleType)
    }
}

/// Debug snapshot of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Identity.
    pub id: PortId,
    /// Open handles.
    pub handles: usize,
    /// Connectors waiting for a listener.
    pub pending: usize,
    /// Accepted connections still referencing the port.
    pub live: usize,
    /// Connection credits available to listeners.
    pub backlog: usize,
    /// Registered connection-event waiters.
    pub waiters: usize,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port {:<6} handles {:<4} pending {:<4} live {:<4} backlog {:<4} waiters {}",
            self.id, self.handles, self.pending, self.live, self.backlog, self.waiters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn port() -> Arc<Port> {
        Port::new(PortId(1), Limits { queue_depth: 4, message_max: 64 })
    }

    #[test]
    fn stale_credit_is_skipped() {
        let port = port();
        // Left behind by a connector that withdrew while a listener held its credit.
        port.conn_sem.up(1);
        assert_eq!(port.listen(Timeout::NonBlocking).unwrap_err(), IpcError::WouldBlock);
        assert_eq!(port.conn_sem.count(), 0);
    }

    #[test]
    fn bounded_listen_on_stale_credit_times_out() {
        let port = port();
        port.conn_sem.up(2);
        let res = port.listen(Timeout::After(Duration::from_millis(10)));
        assert_eq!(res.unwrap_err(), IpcError::TimedOut);
        assert_eq!(port.conn_sem.count(), 0);
    }

    #[test]
    fn destroy_rejects_pending() {
        let port = port();
        let conn = Connection::new(port.limits());
        port.enqueue(&conn).unwrap();
        port.destroy();
        assert_eq!(conn.phase(), ConnPhase::Rejected);
        assert_eq!(conn.rendezvous().count(), 1);
        assert_eq!(port.info(0).backlog, 0);
        assert_eq!(port.enqueue(&conn).unwrap_err(), IpcError::DestinationUnreachable);
    }
}
