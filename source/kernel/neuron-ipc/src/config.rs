// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounds of the IPC core, fixed at kernel init
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! The compiled-in defaults match the values user space is built against.
//! Boards may override them from a JSON blob before the IPC context is
//! constructed; nothing changes afterwards.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Default per-endpoint queue depth.
pub const IPC_QUEUE_MAX: usize = 256;
/// Default maximum message payload in bytes.
pub const IPC_MESSAGE_MAX: usize = 16384;
/// Default maximum number of objects in one multi-object wait.
pub const WAIT_MULTIPLE_MAX: usize = 1024;
/// Lowest port id handed out. Zero is never a valid port id.
pub const PORT_ID_MIN: u32 = 1;
/// Highest port id handed out.
pub const PORT_ID_MAX: u32 = 65535;
/// Default number of handle slots per process.
pub const HANDLE_SLOTS: usize = 1024;

const_assert!(IPC_QUEUE_MAX > 0);
const_assert!(IPC_MESSAGE_MAX > 0);
const_assert!(WAIT_MULTIPLE_MAX > 0);
const_assert!(PORT_ID_MIN > 0 && PORT_ID_MIN <= PORT_ID_MAX);
const_assert!(HANDLE_SLOTS <= u32::MAX as usize);

/// Errors raised while loading or validating [`IpcConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("invalid ipc config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A bound that must be positive was zero.
    #[error("ipc config: `{0}` must be non-zero")]
    Zero(&'static str),
    /// The port id range is empty or includes zero.
    #[error("ipc config: port id range {min}..={max} is invalid")]
    PortIdRange {
        /// Configured lower bound.
        min: u32,
        /// Configured upper bound.
        max: u32,
    },
    /// More handle slots than a handle id can address.
    #[error("ipc config: {0} handle slots exceed the handle id space")]
    HandleSlots(usize),
}

/// Tunable bounds of the IPC core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpcConfig {
    /// Messages an endpoint can queue before senders block.
    pub queue_depth: usize,
    /// Largest accepted payload in bytes.
    pub message_max: usize,
    /// Largest accepted multi-object wait.
    pub wait_max: usize,
    /// First port id of the arena.
    pub port_id_min: u32,
    /// Last port id of the arena, inclusive.
    pub port_id_max: u32,
    /// Handle table size of each process.
    pub handle_slots: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            queue_depth: IPC_QUEUE_MAX,
            message_max: IPC_MESSAGE_MAX,
            wait_max: WAIT_MULTIPLE_MAX,
            port_id_min: PORT_ID_MIN,
            port_id_max: PORT_ID_MAX,
            handle_slots: HANDLE_SLOTS,
        }
    }
}

impl IpcConfig {
    /// Parses and validates a JSON override. Missing fields keep defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every bound is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::Zero("queue_depth"));
        }
        if self.message_max == 0 {
            return Err(ConfigError::Zero("message_max"));
        }
        if self.wait_max == 0 {
            return Err(ConfigError::Zero("wait_max"));
        }
        if self.handle_slots == 0 {
            return Err(ConfigError::Zero("handle_slots"));
        }
        if self.handle_slots > u32::MAX as usize {
            return Err(ConfigError::HandleSlots(self.handle_slots));
        }
        if self.port_id_min == 0 || self.port_id_min > self.port_id_max {
            return Err(ConfigError::PortIdRange { min: self.port_id_min, max: self.port_id_max });
        }
        Ok(())
    }

    /// Number of port ids the arena can hand out.
    pub fn port_id_capacity(&self) -> usize {
        (self.port_id_max - self.port_id_min) as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = IpcConfig::default();
        config.validate().unwrap();
        assert_eq!(config.port_id_capacity(), 65535);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = IpcConfig::from_json(r#"{ "queue_depth": 4, "port_id_max": 8 }"#).unwrap();
        assert_eq!(config.queue_depth, 4);
        assert_eq!(config.port_id_max, 8);
        assert_eq!(config.message_max, IPC_MESSAGE_MAX);
        assert_eq!(config.port_id_capacity(), 8);
    }

    #[test]
    fn rejects_bad_bounds() {
        assert!(matches!(
            IpcConfig::from_json(r#"{ "queue_depth": 0 }"#),
            Err(ConfigError::Zero("queue_depth"))
        ));
        assert!(matches!(
            IpcConfig::from_json(r#"{ "port_id_min": 0 }"#),
            Err(ConfigError::PortIdRange { min: 0, .. })
        ));
        assert!(matches!(
            IpcConfig::from_json(r#"{ "port_id_min": 9, "port_id_max": 3 }"#),
            Err(ConfigError::PortIdRange { min: 9, max: 3 })
        ));
        assert!(matches!(IpcConfig::from_json(r#"{ "bogus": 1 }"#), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn serializes_back() {
        let config = IpcConfig { wait_max: 16, ..IpcConfig::default() };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(IpcConfig::from_json(&text).unwrap(), config);
    }
}
