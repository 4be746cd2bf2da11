//! Channel: ring storage, session counters and the gate that guards them
//!
//! Every access to cursors, counters and the storage slot happens under
//! `state`. Blocking waits use the monitor pattern: the condvar releases and
//! reacquires the gate atomically and the predicate is re-checked on every
//! wake-up.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::ring_buffer::ByteRing;
use super::waiter::{Interest, Waiter};
use crate::error::{Result, ScdError};

/// Default capacity of a channel buffer in bytes
pub const DEFAULT_CAPACITY: usize = 0x8000;

/// Smallest capacity that still leaves one usable byte
pub const MIN_CAPACITY: usize = 2;

/// Access mode requested when a session opens a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    #[inline(always)]
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    #[inline(always)]
    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Per-channel counters. Relaxed, informational only.
#[derive(Debug, Default)]
pub struct ChannelStats {
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    opens: AtomicU64,
    allocations: AtomicU64,
}

/// Point-in-time copy of [`ChannelStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub opens: u64,
    pub allocations: u64,
}

impl ChannelStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }
}

/// State behind the gate
#[derive(Debug, Default)]
struct ChannelState {
    /// Present iff `readers + writers > 0`
    ring: Option<ByteRing>,
    readers: usize,
    writers: usize,
    /// Multiplexer waiters currently watching this channel
    watchers: Vec<Arc<Waiter>>,
}

impl ChannelState {
    fn ring(&self, minor: usize) -> Result<&ByteRing> {
        self.ring
            .as_ref()
            .ok_or_else(|| ScdError::invalid_argument(format!("channel {} is not open", minor)))
    }

    fn ring_mut(&mut self, minor: usize) -> Result<&mut ByteRing> {
        self.ring
            .as_mut()
            .ok_or_else(|| ScdError::invalid_argument(format!("channel {} is not open", minor)))
    }

    fn wake_watchers(&self) {
        for watcher in &self.watchers {
            watcher.wake();
        }
    }

    fn readiness(&self) -> Interest {
        let mut ready = Interest::empty();
        if let Some(ring) = &self.ring {
            if ring.is_readable() {
                ready |= Interest::READABLE;
            }
            if ring.free_space() > 0 {
                ready |= Interest::WRITABLE;
            }
        }
        ready
    }
}

/// One bounded byte pipe.
///
/// The channel lives as long as the device that owns it; its storage comes
/// and goes with the sessions opened on it.
#[derive(Debug)]
pub struct Channel {
    minor: usize,
    state: Mutex<ChannelState>,
    /// Raised after a successful write
    data_available: Condvar,
    /// Raised after a successful read
    space_available: Condvar,
    /// Capacity used for the next allocation
    capacity: AtomicUsize,
    default_capacity: usize,
    stats: ChannelStats,
}

impl Channel {
    pub fn new(minor: usize, default_capacity: usize) -> Self {
        Self {
            minor,
            state: Mutex::new(ChannelState::default()),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity: AtomicUsize::new(default_capacity),
            default_capacity,
            stats: ChannelStats::default(),
        }
    }

    /// Index of this channel within its device
    pub fn minor(&self) -> usize {
        self.minor
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Attach a session: allocate storage on first open, rewind both cursors
    /// and count the session per requested mode.
    pub fn open(&self, mode: AccessMode) -> Result<()> {
        let mut state = self.state.lock();

        if state.ring.is_none() {
            let capacity = self.capacity.load(Ordering::Acquire);
            let ring = ByteRing::try_allocate(capacity)
                .ok_or(ScdError::ResourceExhausted { capacity })?;
            debug!("channel {}: allocated {} byte buffer", self.minor, capacity);
            state.ring = Some(ring);
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        }

        state.ring_mut(self.minor)?.reset();
        if mode.can_read() {
            state.readers += 1;
        }
        if mode.can_write() {
            state.writers += 1;
        }
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        trace!(
            "channel {}: open {:?} (readers={}, writers={})",
            self.minor,
            mode,
            state.readers,
            state.writers
        );

        // Rewinding frees the whole ring.
        state.wake_watchers();
        drop(state);
        self.space_available.notify_all();
        Ok(())
    }

    /// Detach a session; the last one out releases the storage.
    pub fn release(&self, mode: AccessMode) {
        let mut state = self.state.lock();

        if mode.can_read() {
            state.readers = state.readers.saturating_sub(1);
        }
        if mode.can_write() {
            state.writers = state.writers.saturating_sub(1);
        }
        if state.readers == 0 && state.writers == 0 && state.ring.take().is_some() {
            debug!("channel {}: released buffer", self.minor);
        }
    }

    /// Number of sessions currently open per mode, `(readers, writers)`
    pub fn session_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.readers, state.writers)
    }

    /// `true` while storage is allocated
    pub fn is_allocated(&self) -> bool {
        self.state.lock().ring.is_some()
    }

    /// Block on `cond` until `ready` holds, honoring the non-blocking flag and
    /// the session's interrupt mark.
    fn wait_for<'a>(
        &'a self,
        mut state: MutexGuard<'a, ChannelState>,
        cond: &Condvar,
        nonblocking: bool,
        interrupt: &AtomicBool,
        ready: impl Fn(&ByteRing) -> bool,
    ) -> Result<MutexGuard<'a, ChannelState>> {
        while !ready(state.ring(self.minor)?) {
            if nonblocking {
                return Err(ScdError::WouldBlock);
            }
            if interrupt.swap(false, Ordering::AcqRel) {
                return Err(ScdError::Interrupted);
            }
            cond.wait(&mut state);
        }
        Ok(state)
    }

    /// Copy out one contiguous run of at most `dst.len()` bytes.
    ///
    /// Waits for the first byte unless `nonblocking`; never waits for more.
    pub fn read(&self, dst: &mut [u8], nonblocking: bool, interrupt: &AtomicBool) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        let state = self.state.lock();
        let mut state = self.wait_for(
            state,
            &self.data_available,
            nonblocking,
            interrupt,
            ByteRing::is_readable,
        )?;

        let count = state.ring_mut(self.minor)?.read(dst);
        self.stats
            .bytes_read
            .fetch_add(count as u64, Ordering::Relaxed);
        state.wake_watchers();
        drop(state);

        self.space_available.notify_all();
        Ok(count)
    }

    /// Copy in one contiguous run, the longest prefix of `src` that fits.
    pub fn write_run(
        &self,
        src: &[u8],
        nonblocking: bool,
        interrupt: &AtomicBool,
    ) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }

        let state = self.state.lock();
        let mut state = self.wait_for(
            state,
            &self.space_available,
            nonblocking,
            interrupt,
            |ring| ring.free_space() > 0,
        )?;

        let count = state.ring_mut(self.minor)?.write(src);
        self.stats
            .bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
        state.wake_watchers();
        drop(state);

        self.data_available.notify_all();
        Ok(count)
    }

    /// Write all of `src`, one contiguous run per gate acquisition.
    ///
    /// A failure after some bytes went in turns into a short count; only a
    /// call that accepted nothing reports the error.
    pub fn write(&self, src: &[u8], nonblocking: bool, interrupt: &AtomicBool) -> Result<usize> {
        let mut accepted = 0;
        while accepted < src.len() {
            match self.write_run(&src[accepted..], nonblocking, interrupt) {
                Ok(n) => accepted += n,
                Err(e) if accepted > 0 && e.is_transient() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(accepted)
    }

    /// Current readiness, computed under the gate
    pub fn readiness(&self) -> Interest {
        self.state.lock().readiness()
    }

    /// Start delivering readiness changes to `waiter`; returns the readiness
    /// observed while registering.
    pub fn register(&self, waiter: &Arc<Waiter>) -> Interest {
        let mut state = self.state.lock();
        state.watchers.push(Arc::clone(waiter));
        state.readiness()
    }

    pub fn unregister(&self, waiter: &Arc<Waiter>) {
        self.state
            .lock()
            .watchers
            .retain(|w| !Arc::ptr_eq(w, waiter));
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    /// Set `flag` and wake every blocked reader, writer and poller so the
    /// owner of `flag` observes it.
    pub fn interrupt(&self, flag: &AtomicBool) {
        let state = self.state.lock();
        flag.store(true, Ordering::Release);
        self.data_available.notify_all();
        self.space_available.notify_all();
        state.wake_watchers();
    }

    /// Capacity in effect: the live buffer's size while allocated, otherwise
    /// the configured size for the next allocation.
    pub fn capacity(&self) -> usize {
        let state = self.state.lock();
        match &state.ring {
            Some(ring) => ring.capacity(),
            None => self.configured_capacity(),
        }
    }

    /// Capacity the next allocation will use
    pub fn configured_capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Store a new capacity; an allocated buffer keeps its size.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        if capacity < MIN_CAPACITY {
            return Err(ScdError::invalid_argument(format!(
                "capacity {} below minimum {}",
                capacity, MIN_CAPACITY
            )));
        }
        self.capacity.store(capacity, Ordering::Release);
        debug!("channel {}: capacity set to {}", self.minor, capacity);
        Ok(())
    }

    pub fn reset_capacity(&self) {
        self.capacity
            .store(self.default_capacity, Ordering::Release);
        debug!(
            "channel {}: capacity reset to {}",
            self.minor, self.default_capacity
        );
    }
}
