//! Relay: stream file contents into a channel
//!
//! The copy loop re-issues `write` with whatever remains of each chunk until
//! the chunk is fully accepted, so short writes are never dropped.

#[cfg(target_os = "linux")]
mod watcher;

#[cfg(target_os = "linux")]
pub use watcher::DirectoryWatcher;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::debug;

use crate::device::Session;
use crate::error::{Result, ScdError};

/// Chunk size read from the source per iteration
pub const COPY_CHUNK_SIZE: usize = 1024;

/// Copy everything from `src` into `session`.
///
/// Returns the number of bytes delivered. The first write failure aborts the
/// copy; bytes already accepted stay in the channel.
pub fn copy_to_channel<R: Read>(mut src: R, session: &Session) -> Result<u64> {
    let mut chunk = [0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = match src.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ScdError::from_io(e, "reading source")),
        };

        let mut pending = &chunk[..read];
        while !pending.is_empty() {
            let written = session.write(pending)?;
            pending = &pending[written..];
            total += written as u64;
        }
    }

    Ok(total)
}

/// Open `path` read-only and stream it into `session`
pub fn copy_file_to_channel<P: AsRef<Path>>(path: P, session: &Session) -> Result<u64> {
    let path = path.as_ref();
    debug!("copying from {}", path.display());

    let file = File::open(path)
        .map_err(|e| ScdError::from_io(e, &format!("opening {}", path.display())))?;
    copy_to_channel(file, session)
}
