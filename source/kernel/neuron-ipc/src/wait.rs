// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wait multiplexer: drives the object wait contract over one or many handles.
//!
//! Every registration is owned by a [`Registered`] guard, so whichever way
//! the wait ends (fired, timed out, interrupted, a later registration
//! failing) every object sees exactly one `end_wait` for every successful
//! `begin_wait`.

use nexus_sync::{Timeout, WaitSync};

use crate::error::{IpcError, Result};
use crate::object::{Handle, WaitToken};

struct Registered<'a> {
    handle: &'a Handle,
    token: WaitToken,
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        self.handle.object().end_wait(&self.token);
    }
}

/// Waits for `event` on a single object.
pub fn wait(handle: &Handle, event: u32, timeout: Timeout) -> Result<()> {
    let sync = WaitSync::new();
    let token = WaitToken::new(&sync, event, 0);
    handle.object().begin_wait(&token)?;
    let _registered = Registered { handle, token };
    sync.wait(timeout)?;
    Ok(())
}

/// Waits until any of `targets` reports its event and returns its index.
///
/// `targets` must hold between 1 and `max` entries. When several events
/// fire before the waiter runs, the first one recorded is reported.
pub fn wait_multiple(targets: &[(Handle, u32)], timeout: Timeout, max: usize) -> Result<usize> {
    if targets.is_empty() || targets.len() > max {
        return Err(IpcError::InvalidArgument);
    }
    let sync = WaitSync::new();
    let mut registered = Vec::with_capacity(targets.len());
    for (index, (handle, event)) in targets.iter().enumerate() {
        let token = WaitToken::new(&sync, *event, index);
        handle.object().begin_wait(&token)?;
        registered.push(Registered { handle, token });
    }
    let index = sync.wait(timeout)?;
    drop(registered);
    Ok(index)
}
