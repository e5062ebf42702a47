// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall-shaped entry points of the IPC core
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! Each call resolves handles through the caller's [`HandleTable`] and moves
//! payloads and out-parameters through its [`UserMemory`]. Slots for new
//! handles are reserved before anything is committed, so a full table is
//! reported before a port is created or a connection accepted.
//!
//! Out-parameters are little-endian: message types as `u32`, sizes as `u64`.

use std::sync::Arc;

use nexus_sync::Timeout;

use crate::config::{ConfigError, IpcConfig};
use crate::error::{IpcError, Result};
use crate::handle::{HandleId, HandleTable};
use crate::message::{Message, MessageInfo};
use crate::object::{Handle, ObjectType};
use crate::port::PortId;
use crate::registry::Registry;
use crate::usercopy::{UserAddr, UserMemory};
use crate::wait;

/// Calling process as seen by the IPC core.
pub struct Process {
    handles: HandleTable,
    memory: Arc<dyn UserMemory>,
}

impl Process {
    /// Process with an empty handle table sized by `config`.
    pub fn new(config: &IpcConfig, memory: Arc<dyn UserMemory>) -> Self {
        Self { handles: HandleTable::with_capacity(config.handle_slots), memory }
    }

    /// The process's handle table.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// The process's address space.
    pub fn memory(&self) -> &dyn UserMemory {
        self.memory.as_ref()
    }

    /// Closes every handle, as on exit.
    pub fn exit(&self) -> usize {
        self.handles.close_all()
    }
}

/// IPC context, constructed once at kernel init.
pub struct Ipc {
    registry: Arc<Registry>,
}

impl Ipc {
    /// Validates `config` and builds the port registry.
    pub fn new(config: IpcConfig) -> core::result::Result<Self, ConfigError> {
        Ok(Self { registry: Registry::new(config)? })
    }

    /// The port registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &IpcConfig {
        self.registry.config()
    }

    /// New process context using this configuration.
    pub fn process(&self, memory: Arc<dyn UserMemory>) -> Process {
        Process::new(self.config(), memory)
    }

    /// Creates a port.
    pub fn port_create(&self, process: &Process) -> Result<HandleId> {
        let slot = process.handles.reserve()?;
        let port = self.registry.create_port()?;
        Ok(slot.fill(port))
    }

    /// Opens an existing port by id.
    pub fn port_open(&self, process: &Process, id: PortId) -> Result<HandleId> {
        let slot = process.handles.reserve()?;
        let port = self.registry.open_port(id)?;
        Ok(slot.fill(port))
    }

    /// Id of the port behind `handle`.
    pub fn port_id(&self, process: &Process, handle: HandleId) -> Result<PortId> {
        let port = process.handles.get_typed(handle, ObjectType::Port)?;
        Ok(port.port()?.id())
    }

    /// Accepts a connection on the port behind `handle`.
    pub fn port_listen(
        &self,
        process: &Process,
        handle: HandleId,
        timeout: Timeout,
    ) -> Result<HandleId> {
        let port = process.handles.get_typed(handle, ObjectType::Port)?;
        let slot = process.handles.reserve()?;
        let conn = port.port()?.listen(timeout)?;
        Ok(slot.fill(conn))
    }

    /// Connects to port `id`.
    pub fn connection_open(
        &self,
        process: &Process,
        id: PortId,
        timeout: Timeout,
    ) -> Result<HandleId> {
        let slot = process.handles.reserve()?;
        let conn = self.registry.connect(id, timeout)?;
        Ok(slot.fill(conn))
    }

    /// Sends `len` bytes at `buf` with type tag `ty`.
    pub fn message_send(
        &self,
        process: &Process,
        handle: HandleId,
        ty: u32,
        buf: UserAddr,
        len: usize,
    ) -> Result<()> {
        if len > self.config().message_max || (len > 0 && buf.is_null()) {
            return Err(IpcError::InvalidArgument);
        }
        let conn = process.handles.get_typed(handle, ObjectType::Connection)?;
        let endpoint = conn.endpoint()?;
        let mut data = vec![0u8; len];
        process.memory.copy_in(&mut data, buf)?;
        endpoint.send_message(Message::new(ty, data))
    }

    /// Batch send. Always fails with [`IpcError::NotSupported`].
    pub fn message_sendv(
        &self,
        process: &Process,
        handle: HandleId,
        vectors: UserAddr,
        count: usize,
    ) -> Result<()> {
        let _ = (process, handle, vectors, count);
        Err(IpcError::NotSupported)
    }

    /// Reports type and size of the next message without consuming it.
    pub fn message_peek(
        &self,
        process: &Process,
        handle: HandleId,
        timeout: Timeout,
        type_out: Option<UserAddr>,
        size_out: Option<UserAddr>,
    ) -> Result<MessageInfo> {
        let conn = process.handles.get_typed(handle, ObjectType::Connection)?;
        let info = conn.endpoint()?.peek(timeout)?;
        if let Some(at) = type_out {
            process.memory.copy_out(at, &info.ty.to_le_bytes())?;
        }
        if let Some(at) = size_out {
            process.memory.copy_out(at, &(info.size as u64).to_le_bytes())?;
        }
        Ok(info)
    }

    /// Receives the next message into `size` bytes at `buf` and returns the
    /// number of bytes copied. Excess payload is dropped. If a copy faults
    /// the message stays queued.
    pub fn message_receive(
        &self,
        process: &Process,
        handle: HandleId,
        timeout: Timeout,
        type_out: Option<UserAddr>,
        buf: UserAddr,
        size: usize,
    ) -> Result<usize> {
        if size > 0 && buf.is_null() {
            return Err(IpcError::InvalidArgument);
        }
        let conn = process.handles.get_typed(handle, ObjectType::Connection)?;
        let memory = process.memory();
        conn.endpoint()?.receive_with(timeout, |msg| {
            if let Some(at) = type_out {
                memory.copy_out(at, &msg.ty().to_le_bytes())?;
            }
            let n = size.min(msg.len());
            memory.copy_out(buf, &msg.data()[..n])?;
            Ok(n)
        })
    }

    /// Waits for `event` on `handle`.
    pub fn object_wait(
        &self,
        process: &Process,
        handle: HandleId,
        event: u32,
        timeout: Timeout,
    ) -> Result<()> {
        let target = process.handles.get(handle)?;
        wait::wait(&target, event, timeout)
    }

    /// Waits for any of `count` (handle, event) pairs read from the user
    /// arrays at `handles` and `events`; returns the index that fired.
    pub fn object_wait_multiple(
        &self,
        process: &Process,
        handles: UserAddr,
        events: UserAddr,
        count: usize,
        timeout: Timeout,
    ) -> Result<usize> {
        let max = self.config().wait_max;
        if count == 0 || count > max {
            return Err(IpcError::InvalidArgument);
        }
        let ids = process.memory.read_u32_array(handles, count)?;
        let events = process.memory.read_u32_array(events, count)?;
        let targets = ids
            .into_iter()
            .zip(events)
            .map(|(id, event)| Ok((process.handles.get(id)?, event)))
            .collect::<Result<Vec<(Handle, u32)>>>()?;
        wait::wait_multiple(&targets, timeout, max)
    }

    /// Installs another reference to `handle`.
    pub fn handle_duplicate(&self, process: &Process, handle: HandleId) -> Result<HandleId> {
        process.handles.duplicate(handle)
    }

    /// Closes `handle`.
    pub fn handle_close(&self, process: &Process, handle: HandleId) -> Result<()> {
        process.handles.close(handle)
    }
}
