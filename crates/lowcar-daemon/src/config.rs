//! Daemon configuration, with defaults good enough for a robot on a desk.

use std::path::Path;
use std::time::Duration;

use lowcar_protocol::IntervalBounds;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All tunables of the daemon. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Name prefix of the shared-memory hub instance to attach.
    pub shm_prefix: String,
    /// Path prefix of physical serial endpoints; the port index is appended.
    pub physical_prefix: String,
    /// Path prefix of virtual (unix-socket) endpoints.
    pub virtual_prefix: String,
    /// Highest port index probed per namespace.
    pub max_endpoints: usize,
    /// Discovery scan interval.
    pub scan_interval_ms: u64,
    /// Bounded wait for the handshake ACKNOWLEDGEMENT.
    pub handshake_timeout_ms: u64,
    /// Silence window after which a device is declared dead.
    pub device_timeout_ms: u64,
    /// Watchdog check interval.
    pub watchdog_interval_ms: u64,
    /// Outbound role tick: pending commands are drained this often.
    pub command_tick_ms: u64,
    /// Outbound PING cadence.
    pub ping_interval_ms: u64,
    /// Upper bound on one blocking read slice; doubles as the worker
    /// cancellation latency.
    pub read_slice_ms: u64,
    /// How long a failed endpoint is left unprobed.
    pub cooldown_ms: u64,
    /// Clamping bounds for subscription push intervals.
    pub sub_interval_min_ms: u16,
    pub sub_interval_max_ms: u16,
    /// Push interval requested when forwarding a subscription to a device.
    pub sub_request_interval_ms: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shm_prefix: "lowcar".to_string(),
            physical_prefix: "/dev/ttyACM".to_string(),
            virtual_prefix: "/tmp/ttyACM".to_string(),
            max_endpoints: 32,
            scan_interval_ms: 100,
            handshake_timeout_ms: 1000,
            device_timeout_ms: 2500,
            watchdog_interval_ms: 250,
            command_tick_ms: 25,
            ping_interval_ms: 1000,
            read_slice_ms: 500,
            cooldown_ms: 1000,
            sub_interval_min_ms: 40,
            sub_interval_max_ms: 500,
            sub_request_interval_ms: 100,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn command_tick(&self) -> Duration {
        Duration::from_millis(self.command_tick_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn read_slice(&self) -> Duration {
        Duration::from_millis(self.read_slice_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn interval_bounds(&self) -> IntervalBounds {
        IntervalBounds {
            min_ms: self.sub_interval_min_ms,
            max_ms: self.sub_interval_max_ms,
        }
    }
}
