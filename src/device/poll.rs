//! Readiness multiplexer over any number of sessions
//!
//! The poller registers one [`Waiter`] with every watched channel, reading
//! each channel's readiness while its gate is held. Any change after that
//! point wakes the waiter, so a transition between the check and the sleep is
//! never missed. Readiness is re-checked after every wake-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::session::Session;
use crate::core::{Interest, Waiter};
use crate::error::{Result, ScdError};

/// One watched session and what the caller wants from it
#[derive(Debug)]
pub struct PollEntry<'a> {
    session: &'a Session,
    interest: Interest,
    revents: Interest,
}

impl<'a> PollEntry<'a> {
    pub fn new(session: &'a Session, interest: Interest) -> Self {
        Self {
            session,
            interest,
            revents: Interest::empty(),
        }
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Satisfied subset of `interest` after the last poll
    pub fn revents(&self) -> Interest {
        self.revents
    }

    pub fn is_ready(&self) -> bool {
        !self.revents.is_empty()
    }
}

/// Blocks a thread until one of several sessions becomes ready
#[derive(Debug)]
pub struct Poller {
    waiter: Arc<Waiter>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller {
    pub fn new() -> Self {
        Self {
            waiter: Waiter::new(),
        }
    }

    /// Handle that aborts this poller's current or next wait
    pub fn interrupter(&self) -> PollInterrupter {
        PollInterrupter {
            waiter: Arc::clone(&self.waiter),
        }
    }

    /// Wait until at least one entry is ready, `timeout` elapses (`None`
    /// waits forever) or the poller is interrupted.
    ///
    /// Returns the number of ready entries, 0 on timeout. Each entry's
    /// `revents` holds its satisfied interest.
    pub fn poll(&self, entries: &mut [PollEntry<'_>], timeout: Option<Duration>) -> Result<usize> {
        self.poll_marked(entries, timeout, None)
    }

    /// Like [`Poller::poll`], but a set `mark` also aborts the wait and is
    /// consumed. Used for a session's own interrupt mark.
    pub(crate) fn poll_marked(
        &self,
        entries: &mut [PollEntry<'_>],
        timeout: Option<Duration>,
        mark: Option<&AtomicBool>,
    ) -> Result<usize> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        for entry in entries.iter_mut() {
            let ready = entry.session.channel().register(&self.waiter);
            entry.revents = ready & entry.interest;
        }

        let result = self.wait_ready(entries, deadline, mark);

        for entry in entries.iter() {
            entry.session.channel().unregister(&self.waiter);
        }
        result
    }

    fn wait_ready(
        &self,
        entries: &mut [PollEntry<'_>],
        deadline: Option<Instant>,
        mark: Option<&AtomicBool>,
    ) -> Result<usize> {
        let mut ready = entries.iter().filter(|e| e.is_ready()).count();

        while ready == 0 {
            let marked = mark.map_or(false, |m| m.swap(false, Ordering::AcqRel));
            if self.waiter.take_interrupt() || marked {
                return Err(ScdError::Interrupted);
            }
            if !self.waiter.wait_until(deadline) {
                for entry in entries.iter_mut() {
                    entry.revents = Interest::empty();
                }
                return Ok(0);
            }
            ready = 0;
            for entry in entries.iter_mut() {
                entry.revents = entry.session.readiness() & entry.interest;
                if entry.is_ready() {
                    ready += 1;
                }
            }
        }
        Ok(ready)
    }
}

/// Aborts the wait of one [`Poller`]
#[derive(Debug, Clone)]
pub struct PollInterrupter {
    waiter: Arc<Waiter>,
}

impl PollInterrupter {
    pub fn interrupt(&self) {
        self.waiter.interrupt();
    }
}
