//! Readiness interest flags and the wake-up cell used by poll-style waits

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

bitflags::bitflags! {
    /// Readiness a caller is interested in, or a channel currently offers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        /// At least one byte can be read without blocking
        const READABLE = 0b01;
        /// At least one byte can be written without blocking
        const WRITABLE = 0b10;
    }
}

/// Wake-up cell a multiplexer registers with every channel it watches.
///
/// Channels call [`Waiter::wake`] while holding their gate whenever their
/// readiness may have changed. A wake that lands before the owner sleeps is
/// kept in `signaled`, so it is never lost.
#[derive(Debug, Default)]
pub struct Waiter {
    signaled: Mutex<bool>,
    interrupted: AtomicBool,
    cond: Condvar,
}

impl Waiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark the waiter signaled and wake its owner
    pub fn wake(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Abort the owner's current or next wait
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.wake();
    }

    /// Consume a pending interrupt
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Sleep until woken or until `deadline` passes (`None` waits forever).
    ///
    /// Returns `false` on timeout. Consumes the signal either way.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut signaled),
            }
        }
        std::mem::replace(&mut *signaled, false)
    }
}
