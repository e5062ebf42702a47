// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process-wide port registry
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests below, tests/port.rs
//!
//! Maps port ids to ports and counts the open handles of each. Built once
//! at kernel init and handed to everything that creates or resolves ports.
//!
//! INVARIANTS:
//!   - The registry lock is never held while a port or connection lock is taken
//!   - A port id returns to the arena only after the port is fully torn down

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use nexus_sync::{SyncError, Timeout, Wakeup};
use parking_lot::Mutex;

use crate::config::{ConfigError, IpcConfig};
use crate::connection::{Connection, EndpointObject, Limits};
use crate::endpoint::Side;
use crate::error::{IpcError, Result};
use crate::object::Handle;
use crate::port::{Port, PortId, PortInfo, PortObject};

/// Bounded allocator of port ids. Released ids are reused lowest first.
#[derive(Debug)]
struct IdArena {
    // Next never-used id; `None` once the fresh range is consumed.
    next: Option<u32>,
    max: u32,
    released: BTreeSet<u32>,
}

impl IdArena {
    fn new(min: u32, max: u32) -> Self {
        Self { next: Some(min), max, released: BTreeSet::new() }
    }

    fn alloc(&mut self) -> Option<u32> {
        if let Some(id) = self.released.pop_first() {
            return Some(id);
        }
        let id = self.next?;
        self.next = if id < self.max { Some(id + 1) } else { None };
        Some(id)
    }

    fn free(&mut self, id: u32) {
        let fresh = self.released.insert(id);
        debug_assert!(fresh, "port id {id} released twice");
    }
}

struct PortEntry {
    port: Arc<Port>,
    handles: usize,
}

struct RegistryState {
    ports: BTreeMap<PortId, PortEntry>,
    arena: IdArena,
}

/// Table of all live ports.
pub struct Registry {
    config: IpcConfig,
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Builds the registry for `config`.
    pub fn new(config: IpcConfig) -> core::result::Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let arena = IdArena::new(config.port_id_min, config.port_id_max);
        Ok(Arc::new(Self { config, state: Mutex::new(RegistryState { ports: BTreeMap::new(), arena }) }))
    }

    /// Configuration the registry was built with.
    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    fn limits(&self) -> Limits {
        Limits { queue_depth: self.config.queue_depth, message_max: self.config.message_max }
    }

    /// Creates a port and returns its first handle.
    pub fn create_port(self: &Arc<Self>) -> Result<Handle> {
        let port = {
            let mut state = self.state.lock();
            let Some(raw) = state.arena.alloc() else {
                log::warn!(target: "ipc", "port id arena exhausted ({} ports)", state.ports.len());
                return Err(IpcError::ResourceExhausted);
            };
            let port = Port::new(PortId(raw), self.limits());
            state.ports.insert(port.id(), PortEntry { port: Arc::clone(&port), handles: 1 });
            port
        };
        log::debug!(target: "ipc", "port {}: created", port.id());
        Ok(Handle::new(PortObject::new(port, Arc::clone(self))))
    }

    /// Opens another handle to port `id`.
    pub fn open_port(self: &Arc<Self>, id: PortId) -> Result<Handle> {
        let port = {
            let mut state = self.state.lock();
            let entry = state.ports.get_mut(&id).ok_or(IpcError::NotFound)?;
            entry.handles += 1;
            Arc::clone(&entry.port)
        };
        Ok(Handle::new(PortObject::new(port, Arc::clone(self))))
    }

    /// Connects to port `id` and returns the client end once a listener
    /// accepted the connection.
    pub fn connect(self: &Arc<Self>, id: PortId, timeout: Timeout) -> Result<Handle> {
        let port = self.lookup(id)?;
        let conn = Connection::new(port.limits());
        // Created before queueing so an accepted connection always has a client handle.
        let client = Handle::new(EndpointObject::attach(&conn, Side::Client));
        port.enqueue(&conn)?;
        let outcome = conn.rendezvous().down(timeout);
        settle(&port, &conn, client, outcome)
    }

    /// Number of registered ports.
    pub fn port_count(&self) -> usize {
        self.state.lock().ports.len()
    }

    /// Debug snapshot of port `id`.
    pub fn port_info(&self, id: PortId) -> Option<PortInfo> {
        let (port, handles) = {
            let state = self.state.lock();
            let entry = state.ports.get(&id)?;
            (Arc::clone(&entry.port), entry.handles)
        };
        Some(port.info(handles))
    }

    /// Debug snapshot of every port, ordered by id.
    pub fn ports(&self) -> Vec<PortInfo> {
        let entries: Vec<(Arc<Port>, usize)> = {
            let state = self.state.lock();
            state.ports.values().map(|e| (Arc::clone(&e.port), e.handles)).collect()
        };
        entries.into_iter().map(|(port, handles)| port.info(handles)).collect()
    }

    /// Debug dump of every port as JSON.
    pub fn dump_json(&self) -> String {
        serde_json::to_string_pretty(&self.ports()).unwrap_or_else(|err| format!("{{\"error\":\"{err}\"}}"))
    }

    fn lookup(&self, id: PortId) -> Result<Arc<Port>> {
        let state = self.state.lock();
        state.ports.get(&id).map(|e| Arc::clone(&e.port)).ok_or(IpcError::NotFound)
    }

    /// Drops one handle reference; the last one destroys the port.
    pub(crate) fn release(&self, port: &Arc<Port>) {
        let last = {
            let mut state = self.state.lock();
            let Some(entry) = state.ports.get_mut(&port.id()) else {
                panic!("port {} released but not registered", port.id());
            };
            entry.handles -= 1;
            if entry.handles == 0 {
                state.ports.remove(&port.id());
                true
            } else {
                false
            }
        };
        if !last {
            return;
        }
        port.destroy();
        self.state.lock().arena.free(port.id().0);
    }
}

/// Decides what a connector gets once it stopped waiting on the rendezvous.
fn settle(
    port: &Port,
    conn: &Arc<Connection>,
    client: Handle,
    outcome: core::result::Result<Wakeup, SyncError>,
) -> Result<Handle> {
    if let Err(err) = outcome {
        if port.abandon(conn) {
            return Err(err.into());
        }
        // A listener or the teardown got there first and posted the rendezvous.
        conn.rendezvous().try_down();
    }
    if conn.lock().port.is_none() {
        log::debug!(target: "ipc", "port {}: connection {} rejected", port.id(), conn.id());
        return Err(IpcError::DestinationUnreachable);
    }
    Ok(client)
}
