//! Three equally sized slots rotated by a flag register.

use std::fmt;
use std::sync::Arc;

use crate::error::{BufferError, ReadError};
use crate::flags::{FlagReader, FlagWriter, FlagsId, SlotControl, SwapOutcome, TripleBufferFlags};
use crate::region::SharedRegion;

/// Attempts [`TripleBuffer::read_with`] makes before reporting contention.
pub const MAX_READ_ATTEMPTS: u32 = 8;

/// Three shared regions of identical size governed by one flag register.
///
/// The handle is `Clone + Send + Sync`; which thread may write is decided
/// by who holds the register's [`FlagWriter`], not by who holds the buffer.
#[derive(Clone)]
pub struct TripleBuffer {
    slots: Arc<[SharedRegion; 3]>,
    control: Arc<SlotControl>,
}

// Compile-time assertion: TripleBuffer must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TripleBuffer>();
};

impl TripleBuffer {
    /// Allocate three zeroed slots of `len` bytes in the group of `flags`.
    pub fn new(len: usize, flags: &TripleBufferFlags) -> Self {
        Self {
            slots: Arc::new([
                SharedRegion::new(len),
                SharedRegion::new(len),
                SharedRegion::new(len),
            ]),
            control: Arc::clone(flags.control()),
        }
    }

    /// Length of each slot in bytes.
    pub fn len(&self) -> usize {
        self.slots[0].len()
    }

    /// Returns `true` for zero-length slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register governing this buffer.
    pub fn flags_id(&self) -> FlagsId {
        self.control.id()
    }

    fn check_writer(&self, writer: &FlagWriter) -> Result<(), BufferError> {
        if Arc::ptr_eq(&self.control, writer.control()) {
            Ok(())
        } else {
            Err(BufferError::ForeignFlags)
        }
    }

    fn owns_reader(&self, reader: &FlagReader) -> bool {
        Arc::ptr_eq(&self.control, reader.control())
    }

    /// Region currently targeted by the writer.
    pub fn write_region<'a>(&'a self, writer: &'a FlagWriter) -> Result<&'a SharedRegion, BufferError> {
        self.check_writer(writer)?;
        Ok(&self.slots[writer.write_index()])
    }

    /// Region pinned by the reader's last swap, `None` before anything was
    /// published.
    pub fn read_region<'a>(
        &'a self,
        reader: &'a FlagReader,
    ) -> Result<Option<&'a SharedRegion>, BufferError> {
        if !self.owns_reader(reader) {
            return Err(BufferError::ForeignFlags);
        }
        Ok(reader.read_index().map(|i| &self.slots[i]))
    }

    /// Copy `src` into the current write slot.
    pub fn copy_to_write_buffer(&self, writer: &FlagWriter, src: &[u8]) -> Result<(), BufferError> {
        let dst = self.write_region(writer)?;
        if src.len() != dst.len() {
            return Err(BufferError::LengthMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        dst.write_bytes(0, src);
        Ok(())
    }

    /// Copy a whole region into the current write slot.
    pub fn copy_region_to_write_buffer(
        &self,
        writer: &FlagWriter,
        src: &SharedRegion,
    ) -> Result<(), BufferError> {
        let dst = self.write_region(writer)?;
        if src.len() != dst.len() {
            return Err(BufferError::LengthMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        dst.copy_from(src);
        Ok(())
    }

    /// Copy `src` into the write slot and publish it.
    ///
    /// For a buffer in a larger flag group prefer copying every buffer and
    /// swapping the writer once, so consumers see the group at one
    /// generation.
    pub fn commit(&self, writer: &mut FlagWriter, src: &[u8]) -> Result<SwapOutcome, BufferError> {
        self.copy_to_write_buffer(writer, src)?;
        Ok(writer.swap_write_buffer_flags())
    }

    /// Swap the reader and run `f` on the pinned slot, retrying if the
    /// producer reclaimed the slot mid-read.
    pub fn read_with<R>(
        &self,
        reader: &mut FlagReader,
        mut f: impl FnMut(&SharedRegion) -> R,
    ) -> Result<R, ReadError> {
        if !self.owns_reader(reader) {
            return Err(ReadError::ForeignFlags);
        }
        for _ in 0..MAX_READ_ATTEMPTS {
            reader.swap_read_buffer_flags();
            let Some(slot) = reader.read_index() else {
                return Err(ReadError::NothingPublished);
            };
            let out = f(&self.slots[slot]);
            if reader.is_intact() {
                return Ok(out);
            }
        }
        Err(ReadError::Contended {
            attempts: MAX_READ_ATTEMPTS,
        })
    }
}

impl fmt::Debug for TripleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBuffer")
            .field("flags", &self.control.id())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_fresh_reader_sees_bytes() {
        let (flags, mut writer) = TripleBufferFlags::new(1);
        let tb = TripleBuffer::new(4, &flags);
        tb.commit(&mut writer, &[1, 2, 3, 4]).unwrap();
        let mut reader = flags.reader().unwrap();
        let bytes = tb.read_with(&mut reader, |r| r.to_vec()).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn read_before_publish_reports_nothing() {
        let (flags, _writer) = TripleBufferFlags::new(1);
        let tb = TripleBuffer::new(4, &flags);
        let mut reader = flags.reader().unwrap();
        assert_eq!(
            tb.read_with(&mut reader, |r| r.len()),
            Err(ReadError::NothingPublished)
        );
        assert!(tb.read_region(&reader).unwrap().is_none());
    }

    #[test]
    fn length_mismatch_rejected() {
        let (flags, writer) = TripleBufferFlags::new(1);
        let tb = TripleBuffer::new(4, &flags);
        assert_eq!(
            tb.copy_to_write_buffer(&writer, &[0; 3]),
            Err(BufferError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn foreign_writer_rejected() {
        let (flags, _writer) = TripleBufferFlags::new(1);
        let (_other_flags, other_writer) = TripleBufferFlags::new(1);
        let tb = TripleBuffer::new(4, &flags);
        assert_eq!(
            tb.copy_to_write_buffer(&other_writer, &[0; 4]),
            Err(BufferError::ForeignFlags)
        );
    }

    #[test]
    fn group_publishes_all_buffers_at_one_generation() {
        let (flags, mut writer) = TripleBufferFlags::new(1);
        let a = TripleBuffer::new(1, &flags);
        let b = TripleBuffer::new(1, &flags);
        a.copy_to_write_buffer(&writer, &[10]).unwrap();
        b.copy_to_write_buffer(&writer, &[20]).unwrap();
        writer.swap_write_buffer_flags();
        let mut reader = flags.reader().unwrap();
        reader.swap_read_buffer_flags();
        let ra = a.read_region(&reader).unwrap().unwrap().load::<u8>(0);
        let rb = b.read_region(&reader).unwrap().unwrap().load::<u8>(0);
        assert_eq!((ra, rb), (10, 20));
    }

    #[test]
    fn reader_keeps_old_frame_until_it_swaps() {
        let (flags, mut writer) = TripleBufferFlags::new(1);
        let tb = TripleBuffer::new(1, &flags);
        let mut reader = flags.reader().unwrap();
        tb.commit(&mut writer, &[1]).unwrap();
        reader.swap_read_buffer_flags();
        tb.commit(&mut writer, &[2]).unwrap();
        tb.commit(&mut writer, &[3]).unwrap();
        assert_eq!(tb.read_region(&reader).unwrap().unwrap().load::<u8>(0), 1);
        assert!(reader.is_intact());
        reader.swap_read_buffer_flags();
        assert_eq!(tb.read_region(&reader).unwrap().unwrap().load::<u8>(0), 3);
    }
}
