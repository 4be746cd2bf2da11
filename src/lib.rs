//! scd - bounded in-memory byte pipe with device-node semantics
//!
//! Architecture:
//! - Ring: fixed-capacity byte storage, one slot reserved to tell full from empty
//! - Channel: ring + open counters + one gate with "data"/"space" condvars
//! - Device: service object owning the channels; hands out sessions
//! - Session: blocking or non-blocking read/write/control/poll on one channel
//! - Relay: copy loop and directory watcher feeding a channel

pub mod core;
pub mod device;
pub mod error;
pub mod relay;

pub use crate::core::{AccessMode, Interest, StatsSnapshot, DEFAULT_CAPACITY};
pub use crate::device::{
    ControlOp, Device, DeviceConfig, Interrupter, OpenFlags, PollEntry, PollInterrupter, Poller,
    Session,
};
pub use crate::error::{Result, ScdError};
