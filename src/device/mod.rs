//! Device layer: the service object that owns the channels
//!
//! Callers get at a channel by index or by node name and receive a
//! [`Session`]; all data transfer goes through sessions.
//!
//! Features:
//! - Configurable number of channels and default capacity
//! - Blocking and non-blocking sessions
//! - Capacity control requests
//! - Poll-style readiness over many sessions

mod control;
mod poll;
mod session;

use std::sync::Arc;

use log::info;

use crate::core::{AccessMode, Channel, StatsSnapshot, DEFAULT_CAPACITY, MIN_CAPACITY};
use crate::error::{Result, ScdError};

pub use control::{ControlOp, SCD_IOGBSIZE, SCD_IOMAGIC, SCD_IOMAX, SCD_IORBSIZE, SCD_IOSBSIZE};
pub use poll::{PollEntry, PollInterrupter, Poller};
pub use session::{Interrupter, OpenFlags, Session};

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Node name prefix; channel `i` is `"<name><i>"`
    pub name: String,
    pub channel_count: usize,
    /// Capacity each channel starts with and returns to on reset
    pub default_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "scd".to_string(),
            channel_count: 1,
            default_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ScdError::invalid_argument("device name is empty"));
        }
        if self.channel_count == 0 {
            return Err(ScdError::invalid_argument("channel count must be at least 1"));
        }
        if self.default_capacity < MIN_CAPACITY {
            return Err(ScdError::invalid_argument(format!(
                "default capacity {} below minimum {}",
                self.default_capacity, MIN_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Owner of a fixed set of channels.
///
/// Channels persist for the device's lifetime; sessions keep their channel
/// alive on their own, so a session may outlive the `Device` value.
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    channels: Vec<Arc<Channel>>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let channels = (0..config.channel_count)
            .map(|minor| Arc::new(Channel::new(minor, config.default_capacity)))
            .collect();

        info!(
            "device {}: {} channel(s), default capacity {}",
            config.name, config.channel_count, config.default_capacity
        );

        Ok(Self { config, channels })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self, index: usize) -> Result<&Arc<Channel>> {
        self.channels
            .get(index)
            .ok_or_else(|| ScdError::no_device(format!("{}{}", self.config.name, index)))
    }

    /// Open channel `index`
    pub fn open(&self, index: usize, mode: AccessMode, flags: OpenFlags) -> Result<Session> {
        let channel = self.channel(index)?;
        Session::open(Arc::clone(channel), mode, flags)
    }

    /// Open by node name: `"scd0"`, `"/dev/scd0"`, or bare `"scd"` on a
    /// single-channel device.
    pub fn open_path(&self, path: &str, mode: AccessMode, flags: OpenFlags) -> Result<Session> {
        let index = self.resolve(path)?;
        self.open(index, mode, flags)
    }

    fn resolve(&self, path: &str) -> Result<usize> {
        let node = path.strip_prefix("/dev/").unwrap_or(path);
        let suffix = node
            .strip_prefix(self.config.name.as_str())
            .ok_or_else(|| ScdError::no_device(path))?;

        if suffix.is_empty() && self.channels.len() == 1 {
            return Ok(0);
        }
        match suffix.parse::<usize>() {
            Ok(index) if index < self.channels.len() && !suffix.starts_with('+') => Ok(index),
            _ => Err(ScdError::no_device(path)),
        }
    }

    /// Capacity the next allocation of channel `index` will use
    pub fn configured_capacity(&self, index: usize) -> Result<usize> {
        Ok(self.channel(index)?.configured_capacity())
    }

    pub fn stats(&self, index: usize) -> Result<StatsSnapshot> {
        Ok(self.channel(index)?.stats().snapshot())
    }
}
