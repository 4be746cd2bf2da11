//! inotify-backed directory watcher
//!
//! The inotify descriptor is non-blocking and registered with a mio `Poll`
//! through `SourceFd`, so waits can carry a timeout.

use std::ffi::{CString, OsStr};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, trace};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

const WATCH_TOKEN: Token = Token(0);
const EVENT_HEADER_SIZE: usize = std::mem::size_of::<libc::inotify_event>();
const EVENT_BUFFER_SIZE: usize = 1024 * (EVENT_HEADER_SIZE + 16);

/// Reports entries created in one directory
pub struct DirectoryWatcher {
    poll: Poll,
    events: Events,
    fd: OwnedFd,
    dir: PathBuf,
    buffer: Box<[u8]>,
}

impl DirectoryWatcher {
    /// Start watching `dir` for created entries
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        // SAFETY: no pointers involved, result checked below
        let raw = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a fresh descriptor nobody else owns
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let c_dir = CString::new(dir.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
        // SAFETY: `c_dir` is NUL-terminated and outlives the call
        let watch = unsafe { libc::inotify_add_watch(fd.as_raw_fd(), c_dir.as_ptr(), libc::IN_CREATE) };
        if watch < 0 {
            return Err(io::Error::last_os_error());
        }

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut SourceFd(&fd.as_raw_fd()), WATCH_TOKEN, Interest::READABLE)?;

        debug!("watching {}", dir.display());

        Ok(Self {
            poll,
            events: Events::with_capacity(8),
            fd,
            dir,
            buffer: vec![0u8; EVENT_BUFFER_SIZE].into_boxed_slice(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for the next created entry that is not a directory.
    ///
    /// Returns `None` once `timeout` elapses (`None` waits forever). Events
    /// queued behind the returned one in the same batch are discarded.
    pub fn wait_for_created(&mut self, timeout: Option<Duration>) -> io::Result<Option<PathBuf>> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if let Some(path) = self.read_events()? {
                return Ok(Some(path));
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain pending inotify events until a created file shows up or the
    /// descriptor runs dry.
    fn read_events(&mut self) -> io::Result<Option<PathBuf>> {
        loop {
            // SAFETY: buffer is valid for `len` bytes for the whole call
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    self.buffer.as_mut_ptr() as *mut libc::c_void,
                    self.buffer.len(),
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return Ok(None),
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }
            if n == 0 {
                return Ok(None);
            }

            if let Some(path) = self.parse_batch(n as usize) {
                return Ok(Some(path));
            }
        }
    }

    fn parse_batch(&self, len: usize) -> Option<PathBuf> {
        let mut offset = 0;

        while offset + EVENT_HEADER_SIZE <= len {
            // SAFETY: the kernel writes whole events; read_unaligned copes with
            // the byte buffer's alignment
            let event: libc::inotify_event = unsafe {
                std::ptr::read_unaligned(self.buffer.as_ptr().add(offset) as *const libc::inotify_event)
            };
            let name_start = offset + EVENT_HEADER_SIZE;
            let name_end = (name_start + event.len as usize).min(len);
            offset = name_start + event.len as usize;

            if event.len == 0 || event.mask & libc::IN_CREATE == 0 {
                continue;
            }

            let raw = &self.buffer[name_start..name_end];
            let name = raw.split(|&b| b == 0).next().unwrap_or(raw);
            let name = OsStr::from_bytes(name);

            if event.mask & libc::IN_ISDIR != 0 {
                trace!("directory created: {:?}", name);
                continue;
            }

            debug!("file created: {:?}", name);
            return Some(self.dir.join(name));
        }

        None
    }
}
