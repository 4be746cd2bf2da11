//! Fixed-capacity byte ring with read/write cursors
//!
//! Pure data structure, no locking. The owner (a channel) serializes access.
//!
//! - One slot is always kept free so `read == write` means empty
//! - A single `write`/`read` never crosses the physical end of storage;
//!   callers loop to move a logical transfer that wraps

use std::fmt;

/// Byte ring over an owned, heap-allocated slice.
pub struct ByteRing {
    storage: Box<[u8]>,
    read: usize,
    write: usize,
}

impl ByteRing {
    /// Allocate a ring of `capacity` bytes (`capacity - 1` usable).
    ///
    /// Returns `None` if the allocator refuses the request. `capacity` must be
    /// at least 2; callers validate that before reaching here.
    pub fn try_allocate(capacity: usize) -> Option<Self> {
        debug_assert!(capacity >= 2, "ring needs at least one usable byte");

        let mut storage = Vec::new();
        storage.try_reserve_exact(capacity).ok()?;
        storage.resize(capacity, 0u8);

        Some(Self {
            storage: storage.into_boxed_slice(),
            read: 0,
            write: 0,
        })
    }

    /// Size of the storage in bytes
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Move both cursors back to the start, discarding resident bytes
    #[inline]
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// `true` when at least one byte is resident
    #[inline(always)]
    pub fn is_readable(&self) -> bool {
        self.read != self.write
    }

    /// Bytes that can still be written before the ring is full
    #[inline(always)]
    pub fn free_space(&self) -> usize {
        let capacity = self.capacity();
        if self.read == self.write {
            capacity - 1
        } else if self.read > self.write {
            self.read - self.write - 1
        } else {
            capacity - (self.write - self.read) - 1
        }
    }

    /// Bytes currently resident
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.capacity() - 1 - self.free_space()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        !self.is_readable()
    }

    /// Longest run that can be written at the write cursor without wrapping
    /// and without catching up with the read cursor.
    #[inline]
    fn contiguous_free(&self) -> usize {
        let end = self.capacity();
        if self.write >= self.read {
            if self.read == 0 {
                // Filling to the end would make write == read.
                end - self.write - 1
            } else {
                end - self.write
            }
        } else {
            self.read - self.write - 1
        }
    }

    /// Longest resident run starting at the read cursor
    #[inline]
    fn contiguous_resident(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.capacity() - self.read
        }
    }

    /// Copy the longest prefix of `src` that fits the contiguous free run.
    ///
    /// Returns the number of bytes accepted, 0 when the ring is full.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.contiguous_free());
        if count == 0 {
            return 0;
        }

        let start = self.write;
        self.storage[start..start + count].copy_from_slice(&src[..count]);

        self.write = (start + count) % self.capacity();
        count
    }

    /// Copy out at most `dst.len()` bytes from the contiguous resident run.
    ///
    /// Returns the number of bytes copied, 0 when the ring is empty.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.contiguous_resident());
        if count == 0 {
            return 0;
        }

        let start = self.read;
        dst[..count].copy_from_slice(&self.storage[start..start + count]);

        self.read = (start + count) % self.capacity();
        count
    }
}

impl fmt::Debug for ByteRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteRing")
            .field("capacity", &self.capacity())
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}
