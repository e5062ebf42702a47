// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel local IPC core and the generic object wait framework
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: unit tests per module, tests/{connection,port,wait,syscall}.rs
//!
//! PUBLIC API:
//!   - Ipc / Process: syscall-shaped surface (port_*, connection_open, message_*, object_wait*)
//!   - Registry: port id -> port table, created once at init
//!   - PortObject / EndpointObject: objects behind port and connection handles
//!   - KernelObject / Handle / WaitToken: object wait contract
//!   - wait / wait_multiple: wait multiplexer
//!   - HandleTable: per-process handle slots
//!   - UserMemory / HostMemory: user copy boundary
//!   - IpcConfig: bounds (queue depth, message size, wait count, port ids)
//!
//! DEPENDS_ON:
//!   - nexus-sync: semaphores, wait-sync, notifiers, timeouts, interrupts
//!   - parking_lot: object locks
//!   - log: lifecycle tracing under target "ipc"
//!   - thiserror: IpcError / ConfigError
//!   - serde, serde_json: configuration and debug dumps
//!   - static_assertions: compile-time checks of default bounds
//!
//! INVARIANTS:
//!   - Lock order: registry (released first) -> port -> connection -> semaphore
//!   - Every successful begin_wait is paired with exactly one end_wait
//!   - Messages are delivered per endpoint in send order

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod message;
pub mod object;
pub mod port;
pub mod registry;
pub mod syscall;
pub mod usercopy;
pub mod wait;

pub use config::{ConfigError, IpcConfig};
pub use connection::{ConnPhase, Connection, EndpointObject, Limits};
pub use endpoint::{EndpointInfo, Side};
pub use error::{IpcError, Result};
pub use handle::{HandleId, HandleTable, Reservation};
pub use message::{Message, MessageInfo, Received};
pub use object::{
    Handle, KernelObject, ObjectType, WaitToken, CONNECTION_EVENT_HANGUP, CONNECTION_EVENT_MESSAGE,
    PORT_EVENT_CONNECTION,
};
pub use port::{Port, PortId, PortInfo, PortObject};
pub use registry::Registry;
pub use syscall::{Ipc, Process};
pub use usercopy::{HostMemory, UserAddr, UserMemory};
pub use wait::{wait, wait_multiple};

pub use nexus_sync::{Interrupt, Timeout};
