//! Fixed-capacity circular store of interleaved samples.
//!
//! ## Empty vs. full
//!
//! Both an empty and a full ring collapse the cursors to `read == write`.
//! The `full` flag is the only thing that tells them apart:
//!
//! ```text
//! read == write && !full  → 0 samples occupied
//! read == write &&  full  → capacity samples occupied
//! otherwise               → (write - read + capacity) % capacity
//! ```
//!
//! `SampleRing` never blocks and does no locking. Blocking the writer while
//! the ring is full is the owner's job (see `engine::BufferedSampler`).

use crate::format::Sample;

#[derive(Debug, Clone)]
pub struct SampleRing {
    storage: Box<[Sample]>,
    read: usize,
    write: usize,
    full: bool,
}

impl SampleRing {
    /// Create an empty ring holding at most `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread samples.
    pub fn occupied(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.write + self.capacity() - self.read) % self.capacity()
        }
    }

    /// Number of samples that can be written before the ring is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.occupied()
    }

    /// Free samples between the write cursor and either the read cursor or
    /// the end of storage, whichever comes first.
    pub fn contiguous_free(&self) -> usize {
        if self.full {
            0
        } else if self.write >= self.read {
            self.capacity() - self.write
        } else {
            self.read - self.write
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Copy as many samples from `src` as fit and return how many were written.
    ///
    /// A destination region that crosses the end of storage is split into a
    /// tail copy and a head copy.
    pub fn write(&mut self, src: &[Sample]) -> usize {
        let n = src.len().min(self.free());
        if n == 0 {
            return 0;
        }

        let cap = self.capacity();
        let tail = (cap - self.write).min(n);
        self.storage[self.write..self.write + tail].copy_from_slice(&src[..tail]);
        if tail < n {
            self.storage[..n - tail].copy_from_slice(&src[tail..n]);
        }

        self.write = (self.write + n) % cap;
        self.full = self.write == self.read;
        n
    }

    /// Copy up to `dst.len()` unread samples into `dst` and return how many
    /// were copied. Returns 0 when the ring is empty.
    pub fn read(&mut self, dst: &mut [Sample]) -> usize {
        let n = dst.len().min(self.occupied());
        if n == 0 {
            return 0;
        }

        let cap = self.capacity();
        let tail = (cap - self.read).min(n);
        dst[..tail].copy_from_slice(&self.storage[self.read..self.read + tail]);
        if tail < n {
            dst[tail..n].copy_from_slice(&self.storage[..n - tail]);
        }

        self.read = (self.read + n) % cap;
        self.full = false;
        n
    }
}
