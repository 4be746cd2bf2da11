//! Core module: byte ring, channel gate and readiness waiters
//!
//! Design principles:
//! - Copy-in/copy-out: storage is never lent to callers
//! - One gate per channel: cursors, counters and storage change only under it
//! - Monitor-style waits: condvar release/reacquire is atomic, predicates re-checked

mod channel;
mod ring_buffer;
mod waiter;

pub use channel::{
    AccessMode, Channel, ChannelStats, StatsSnapshot, DEFAULT_CAPACITY, MIN_CAPACITY,
};
pub use ring_buffer::ByteRing;
pub use waiter::{Interest, Waiter};
