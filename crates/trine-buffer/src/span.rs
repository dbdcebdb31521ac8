//! Typed fixed-length windows over a [`SharedRegion`].
//!
//! [`Span`] reads and writes; [`ReadSpan`] only reads. Both are `Copy`
//! handles borrowing the region, so a view can hand out as many as it
//! has fields without aliasing concerns.

use std::fmt;
use std::marker::PhantomData;

use trine_core::Element;

use crate::region::SharedRegion;

/// Writable typed span of `len` elements starting at a byte offset.
pub struct Span<'a, T: Element> {
    region: &'a SharedRegion,
    offset: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

/// Read-only typed span of `len` elements starting at a byte offset.
pub struct ReadSpan<'a, T: Element> {
    region: &'a SharedRegion,
    offset: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> Clone for Span<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element> Copy for Span<'_, T> {}

impl<T: Element> Clone for ReadSpan<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element> Copy for ReadSpan<'_, T> {}

impl<'a, T: Element> Span<'a, T> {
    /// The caller guarantees `offset + len * size_of::<T>() <= region.len()`.
    pub(crate) fn new(region: &'a SharedRegion, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len * T::TYPE.size() <= region.len());
        Self {
            region,
            offset,
            len,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the span has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of the first element within the region.
    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    /// Byte length of the span.
    pub fn byte_len(&self) -> usize {
        self.len * T::TYPE.size()
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len, "index {index} out of span of {}", self.len);
        self.region.load(self.offset + index * T::TYPE.size())
    }

    /// Read element `index`, or `None` if out of range.
    pub fn try_get(&self, index: usize) -> Option<T> {
        (index < self.len).then(|| self.region.load(self.offset + index * T::TYPE.size()))
    }

    /// Write element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&self, index: usize, value: T) {
        assert!(index < self.len, "index {index} out of span of {}", self.len);
        self.region.store(self.offset + index * T::TYPE.size(), value);
    }

    /// Write every element.
    pub fn fill(&self, value: T) {
        for i in 0..self.len {
            self.region.store(self.offset + i * T::TYPE.size(), value);
        }
    }

    /// Overwrite the span with `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != len`.
    pub fn copy_from_slice(&self, values: &[T]) {
        assert_eq!(values.len(), self.len, "slice length does not match span");
        self.region
            .write_bytes(self.offset, bytemuck::cast_slice(values));
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Iterate the elements by value.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let region = self.region;
        let offset = self.offset;
        (0..self.len).map(move |i| region.load(offset + i * T::TYPE.size()))
    }

    /// Narrow to a read-only span.
    pub fn as_read(&self) -> ReadSpan<'a, T> {
        ReadSpan::new(self.region, self.offset, self.len)
    }
}

impl<'a, T: Element> ReadSpan<'a, T> {
    pub(crate) fn new(region: &'a SharedRegion, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len * T::TYPE.size() <= region.len());
        Self {
            region,
            offset,
            len,
            _marker: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the span has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of the first element within the region.
    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    /// Read element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> T {
        assert!(index < self.len, "index {index} out of span of {}", self.len);
        self.region.load(self.offset + index * T::TYPE.size())
    }

    /// Read element `index`, or `None` if out of range.
    pub fn try_get(&self, index: usize) -> Option<T> {
        (index < self.len).then(|| self.region.load(self.offset + index * T::TYPE.size()))
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Iterate the elements by value.
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let region = self.region;
        let offset = self.offset;
        (0..self.len).map(move |i| region.load(offset + i * T::TYPE.size()))
    }
}

impl<T: Element> fmt::Debug for Span<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Element> fmt::Debug for ReadSpan<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_through_span() {
        let region = SharedRegion::new(16);
        let span = Span::<u32>::new(&region, 4, 3);
        span.set(0, 7);
        span.set(2, 9);
        assert_eq!(span.to_vec(), vec![7, 0, 9]);
        assert_eq!(region.load::<u32>(12), 9);
        assert_eq!(span.try_get(3), None);
    }

    #[test]
    fn copy_from_slice_writes_in_place() {
        let region = SharedRegion::new(16);
        let span = Span::<f32>::new(&region, 0, 4);
        span.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let read = span.as_read();
        assert_eq!(read.get(3), 4.0);
        assert_eq!(read.iter().sum::<f32>(), 10.0);
    }

    #[test]
    fn fill_only_touches_span() {
        let region = SharedRegion::new(8);
        Span::<u16>::new(&region, 2, 2).fill(0xFFFF);
        assert_eq!(region.to_vec(), vec![0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "out of span")]
    fn set_out_of_range_panics() {
        let region = SharedRegion::new(4);
        Span::<u8>::new(&region, 0, 4).set(4, 1);
    }
}
