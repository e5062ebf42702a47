// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the IPC integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use neuron_ipc::{Handle, IpcConfig, PortId, Registry, Timeout};

/// Upper bound for any wait that is expected to succeed.
pub const PATIENCE: Timeout = Timeout::After(Duration::from_secs(10));

/// Registry with a small queue so backpressure is cheap to reach.
pub fn registry(queue_depth: usize) -> Arc<Registry> {
    Registry::new(IpcConfig { queue_depth, ..IpcConfig::default() }).unwrap()
}

/// Creates a port and returns (port handle, id).
pub fn port(registry: &Arc<Registry>) -> (Handle, PortId) {
    let port = registry.create_port().unwrap();
    let id = port.port().unwrap().id();
    (port, id)
}

/// Establishes one connection on `port` and returns (server end, client end).
pub fn connect(registry: &Arc<Registry>, port: &Handle) -> (Handle, Handle) {
    let id = port.port().unwrap().id();
    let connector = {
        let registry = Arc::clone(registry);
        thread::spawn(move || registry.connect(id, PATIENCE))
    };
    let server = port.port().unwrap().listen(PATIENCE).unwrap();
    let client = connector.join().unwrap().unwrap();
    (server, client)
}

/// Polls `cond` until it holds, failing the test after a few seconds.
pub fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting for {what}");
}
