//! A triple buffer whose slots are read through one schema.

use std::sync::Arc;

use crate::error::{BufferError, ReadError};
use crate::flags::{FlagReader, FlagWriter, FlagsId, SwapOutcome, TripleBufferFlags};
use crate::schema::Schema;
use crate::triple::TripleBuffer;
use crate::view::{ObjectBufferView, ReadView, WriteView};

/// Three schema-conformant slots sharing one layout.
///
/// Producers mutate a local [`ObjectBufferView`] during a tick and publish
/// it with [`commit`](Self::commit) (group member) or
/// [`commit_and_swap`](Self::commit_and_swap) (standalone). Consumers read
/// through [`read_view`](Self::read_view), which borrows the reader so the
/// view cannot outlive the next read swap:
///
/// ```compile_fail
/// use trine_buffer::{ObjectTripleBuffer, Schema, TripleBufferFlags};
/// use trine_core::ElementType;
///
/// let schema = Schema::builder("hp").field("hp", ElementType::U32, 1).build().unwrap();
/// let (flags, _writer) = TripleBufferFlags::new(1);
/// let otb = ObjectTripleBuffer::new(schema, &flags);
/// let mut reader = flags.reader().unwrap();
/// reader.swap_read_buffer_flags();
/// let view = otb.read_view(&reader).unwrap().unwrap();
/// reader.swap_read_buffer_flags();
/// let _ = view.span::<u32>("hp");
/// ```
#[derive(Clone, Debug)]
pub struct ObjectTripleBuffer {
    buffer: TripleBuffer,
    schema: Arc<Schema>,
}

impl ObjectTripleBuffer {
    /// Allocate slots sized to `schema` in the group of `flags`.
    pub fn new(schema: Arc<Schema>, flags: &TripleBufferFlags) -> Self {
        Self {
            buffer: TripleBuffer::new(schema.size_of(), flags),
            schema,
        }
    }

    /// The shared layout.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The underlying byte-level buffer.
    pub fn buffer(&self) -> &TripleBuffer {
        &self.buffer
    }

    /// Register governing this buffer.
    pub fn flags_id(&self) -> FlagsId {
        self.buffer.flags_id()
    }

    /// A fresh local working view with this buffer's schema.
    pub fn local_view(&self) -> ObjectBufferView {
        ObjectBufferView::new(Arc::clone(&self.schema))
    }

    /// Copy `local` into the current write slot without publishing.
    ///
    /// The writer's next [`swap_write_buffer_flags`](FlagWriter::swap_write_buffer_flags)
    /// publishes it together with every other buffer of the group.
    pub fn commit(&self, writer: &FlagWriter, local: &ObjectBufferView) -> Result<(), BufferError> {
        if local.schema().id() != self.schema.id() {
            return Err(BufferError::SchemaMismatch {
                expected: self.schema.name().to_string(),
                actual: local.schema().name().to_string(),
            });
        }
        let src = local.region();
        if src.len() == self.buffer.len() {
            self.buffer.copy_region_to_write_buffer(writer, src)
        } else {
            let mut bytes = vec![0u8; self.buffer.len()];
            src.read_bytes(0, &mut bytes);
            self.buffer.copy_to_write_buffer(writer, &bytes)
        }
    }

    /// Copy `local` into the write slot and publish it.
    pub fn commit_and_swap(
        &self,
        writer: &mut FlagWriter,
        local: &ObjectBufferView,
    ) -> Result<SwapOutcome, BufferError> {
        self.commit(writer, local)?;
        Ok(writer.swap_write_buffer_flags())
    }

    /// View of the slot pinned by the reader's last swap.
    pub fn read_view<'a>(&'a self, reader: &'a FlagReader) -> Result<Option<ReadView<'a>>, BufferError> {
        Ok(self
            .buffer
            .read_region(reader)?
            .map(|region| ReadView::new(&self.schema, region)))
    }

    /// View of the current write slot.
    pub fn write_view<'a>(&'a self, writer: &'a FlagWriter) -> Result<WriteView<'a>, BufferError> {
        let region = self.buffer.write_region(writer)?;
        Ok(WriteView::new(&self.schema, region))
    }

    /// Swap the reader and run `f` on the pinned frame, retrying on
    /// contention. See [`TripleBuffer::read_with`].
    pub fn read_with<R>(
        &self,
        reader: &mut FlagReader,
        mut f: impl FnMut(ReadView<'_>) -> R,
    ) -> Result<R, ReadError> {
        let schema = &*self.schema;
        self.buffer
            .read_with(reader, |region| f(ReadView::new(schema, region)))
    }
}
