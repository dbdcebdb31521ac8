//! Bump allocator handing out typed spans over one [`SharedRegion`].
//!
//! The cursor is local state: two threads that replay the same sequence of
//! [`add_view`](CursorBuffer::add_view) calls over handles to the same
//! region obtain spans at identical offsets. [`Schema`](crate::Schema)
//! compiles that sequence once instead, and is the preferred way to share a
//! layout between threads.

use std::cell::Cell;

use trine_core::{Element, ElementType};

use crate::error::BufferError;
use crate::region::SharedRegion;
use crate::span::Span;

/// Round `offset` up to the next multiple of `align` (a power of two).
pub(crate) fn align_up(offset: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    Some(offset.checked_add(align - 1)? & !(align - 1))
}

/// Byte range an allocation of `count` elements of `ty` takes when the
/// cursor sits at `cursor`, or `None` on arithmetic overflow.
pub(crate) fn place(cursor: usize, ty: ElementType, count: usize) -> Option<(usize, usize)> {
    let start = align_up(cursor, ty.align())?;
    let end = start.checked_add(count.checked_mul(ty.size())?)?;
    Some((start, end))
}

/// Bump allocator over a shared region.
///
/// Not `Sync`: the cursor is a `Cell`, so each thread builds its own
/// `CursorBuffer` over its own handle to the region.
pub struct CursorBuffer {
    region: SharedRegion,
    cursor: Cell<usize>,
}

impl CursorBuffer {
    /// Wrap `region` with the cursor at 0.
    pub fn new(region: SharedRegion) -> Self {
        Self {
            region,
            cursor: Cell::new(0),
        }
    }

    /// Allocate a fresh zeroed region of `len` bytes and wrap it.
    pub fn with_capacity(len: usize) -> Self {
        Self::new(SharedRegion::new(len))
    }

    /// Allocate `count` elements of `T` at the next aligned offset.
    ///
    /// The cursor is rounded up to `T`'s alignment first, then advanced past
    /// the span. On failure the cursor is left untouched.
    pub fn add_view<T: Element>(&self, count: usize) -> Result<Span<'_, T>, BufferError> {
        let capacity = self.region.len();
        let requested = count.saturating_mul(T::TYPE.size());
        let cursor = self.cursor.get();
        let (start, end) = place(cursor, T::TYPE, count).ok_or(BufferError::OutOfSpace {
            requested,
            offset: cursor,
            capacity,
        })?;
        if end > capacity {
            return Err(BufferError::OutOfSpace {
                requested,
                offset: start,
                capacity,
            });
        }
        self.cursor.set(end);
        Ok(Span::new(&self.region, start, count))
    }

    /// Reset the cursor to 0.
    ///
    /// Memory is not zeroed. Taking `&mut self` guarantees no span from
    /// before the reset is still alive.
    pub fn clear(&mut self) {
        self.cursor.set(0);
    }

    /// Current cursor position in bytes.
    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    /// Bytes left after the cursor (ignoring alignment padding).
    pub fn remaining(&self) -> usize {
        self.region.len() - self.cursor.get()
    }

    /// The wrapped region.
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }
}
