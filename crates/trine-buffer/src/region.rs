//! Fixed-length byte regions shared between threads.
//!
//! A [`SharedRegion`] is allocated once and never resized. Every byte is an
//! `AtomicU8` accessed with `Relaxed` ordering; cross-thread visibility is
//! established by the acquire/release edges of the triple-buffer protocol,
//! not by the region itself. This keeps the crate free of `unsafe` while
//! still letting a producer and its consumers hold the same allocation.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use trine_core::Element;

/// A fixed-length byte buffer with shared ownership.
///
/// Cloning is cheap and yields another handle to the same bytes. The
/// allocation is freed when the last handle drops.
#[derive(Clone)]
pub struct SharedRegion {
    bytes: Arc<[AtomicU8]>,
}

// Compile-time assertion: SharedRegion must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SharedRegion>();
};

impl SharedRegion {
    /// Allocate a zero-filled region of `len` bytes.
    pub fn new(len: usize) -> Self {
        let bytes: Vec<AtomicU8> = (0..len).map(|_| AtomicU8::new(0)).collect();
        Self {
            bytes: bytes.into(),
        }
    }

    /// Allocate a region initialised from `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let bytes: Vec<AtomicU8> = data.iter().map(|&b| AtomicU8::new(b)).collect();
        Self {
            bytes: bytes.into(),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length region.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` if both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &SharedRegion) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Read one element at byte `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + size_of::<T>()` exceeds the region.
    pub fn load<T: Element>(&self, offset: usize) -> T {
        let mut value = <T as bytemuck::Zeroable>::zeroed();
        let dst = bytemuck::bytes_of_mut(&mut value);
        let src = &self.bytes[offset..offset + dst.len()];
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.load(Ordering::Relaxed);
        }
        value
    }

    /// Write one element at byte `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + size_of::<T>()` exceeds the region.
    pub fn store<T: Element>(&self, offset: usize, value: T) {
        let src = bytemuck::bytes_of(&value);
        let dst = &self.bytes[offset..offset + src.len()];
        for (d, s) in dst.iter().zip(src) {
            d.store(*s, Ordering::Relaxed);
        }
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the region.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        let src = &self.bytes[offset..offset + out.len()];
        for (d, s) in out.iter_mut().zip(src) {
            *d = s.load(Ordering::Relaxed);
        }
    }

    /// Copy `data` into the region starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the region.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        let dst = &self.bytes[offset..offset + data.len()];
        for (d, s) in dst.iter().zip(data) {
            d.store(*s, Ordering::Relaxed);
        }
    }

    /// Copy the full content of `other` into this region.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ. Callers on the protocol path check
    /// lengths first and report [`BufferError::LengthMismatch`](crate::BufferError::LengthMismatch).
    pub fn copy_from(&self, other: &SharedRegion) {
        assert_eq!(self.len(), other.len(), "region length mismatch");
        for (d, s) in self.bytes.iter().zip(other.bytes.iter()) {
            d.store(s.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    /// Set every byte in `range` to `value`.
    pub fn fill_range(&self, range: std::ops::Range<usize>, value: u8) {
        for b in &self.bytes[range] {
            b.store(value, Ordering::Relaxed);
        }
    }

    /// Zero the whole region.
    pub fn zero(&self) {
        self.fill_range(0..self.len(), 0);
    }

    /// Snapshot the region into an owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
