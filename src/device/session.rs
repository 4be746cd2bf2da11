//! Session handles: one per successful open

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::control::ControlOp;
use super::poll::{PollEntry, Poller};
use crate::core::{AccessMode, Channel, Interest};
use crate::error::{Result, ScdError};

bitflags::bitflags! {
    /// Flags given at open time
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Fail with `WouldBlock` instead of waiting
        const NONBLOCK = 0o4000;
    }
}

/// Capability to read from and/or write to one channel.
///
/// Closing happens exactly once: on [`Session::close`] or on drop. A session
/// is `Sync`; one reader thread and one writer thread may share it.
#[derive(Debug)]
pub struct Session {
    channel: Arc<Channel>,
    mode: AccessMode,
    nonblocking: AtomicBool,
    interrupted: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn open(channel: Arc<Channel>, mode: AccessMode, flags: OpenFlags) -> Result<Self> {
        channel.open(mode)?;
        Ok(Self {
            channel,
            mode,
            nonblocking: AtomicBool::new(flags.contains(OpenFlags::NONBLOCK)),
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Index of the channel this session is bound to
    pub fn minor(&self) -> usize {
        self.channel.minor()
    }

    pub(crate) fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Relaxed)
    }

    /// Switch between blocking and non-blocking mode after open
    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::Relaxed);
    }

    /// Handle that aborts this session's blocking waits from another thread
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            channel: Arc::clone(&self.channel),
            flag: Arc::clone(&self.interrupted),
        }
    }

    /// Read one contiguous run, at least one byte unless non-blocking.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.mode.can_read() {
            return Err(ScdError::BadMode { operation: "reading" });
        }
        self.channel
            .read(buf, self.is_nonblocking(), &self.interrupted)
    }

    /// Write `buf`, waiting for space between runs in blocking mode.
    ///
    /// May return a short count when interrupted or non-blocking.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.mode.can_write() {
            return Err(ScdError::BadMode { operation: "writing" });
        }
        self.channel
            .write(buf, self.is_nonblocking(), &self.interrupted)
    }

    /// Fd-style read of `max_len` bytes into `buf`
    pub fn read_into(&self, buf: &mut [u8], max_len: usize) -> Result<usize> {
        let available = buf.len();
        let dst = buf.get_mut(..max_len).ok_or(ScdError::Fault {
            requested: max_len,
            available,
        })?;
        self.read(dst)
    }

    /// Fd-style write of `len` bytes from `buf`
    pub fn write_from(&self, buf: &[u8], len: usize) -> Result<usize> {
        let src = buf.get(..len).ok_or(ScdError::Fault {
            requested: len,
            available: buf.len(),
        })?;
        self.write(src)
    }

    /// Readable/writable state right now
    pub fn readiness(&self) -> Interest {
        self.channel.readiness()
    }

    /// Wait until this session satisfies `interest` or `timeout` elapses.
    ///
    /// Returns the satisfied subset, empty on timeout. The session's
    /// [`Interrupter`] aborts the wait with `Interrupted`.
    pub fn poll(&self, interest: Interest, timeout: Option<Duration>) -> Result<Interest> {
        let poller = Poller::new();
        let mut entries = [PollEntry::new(self, interest)];
        poller.poll_marked(&mut entries, timeout, Some(&self.interrupted))?;
        Ok(entries[0].revents())
    }

    /// Size of the allocated buffer. Keeps its value across a SetCapacity
    /// until the channel is fully closed and reopened.
    pub fn buffer_capacity(&self) -> usize {
        self.channel.capacity()
    }

    /// Typed control request. Get returns the capacity, Set/Reset return 0.
    pub fn control(&self, op: ControlOp) -> Result<usize> {
        match op {
            ControlOp::GetCapacity => Ok(self.channel.configured_capacity()),
            ControlOp::SetCapacity(capacity) => {
                self.channel.set_capacity(capacity)?;
                Ok(0)
            }
            ControlOp::ResetCapacity => {
                self.channel.reset_capacity();
                Ok(0)
            }
        }
    }

    /// Raw control request, validated before anything changes
    pub fn ioctl(&self, cmd: u32, arg: usize) -> Result<usize> {
        self.control(ControlOp::decode(cmd, arg)?)
    }

    /// Close explicitly; equivalent to dropping the session
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.channel.release(self.mode);
    }
}

/// Aborts blocking reads, writes and polls of one session
#[derive(Debug, Clone)]
pub struct Interrupter {
    channel: Arc<Channel>,
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    /// The session's current or next blocking wait fails with `Interrupted`
    pub fn interrupt(&self) {
        self.channel.interrupt(&self.flag);
    }
}

impl io::Read for Session {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(self, buf).map_err(Into::into)
    }
}

impl io::Read for &Session {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(*self, buf).map_err(Into::into)
    }
}

impl io::Write for Session {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Session::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &Session {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Session::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
