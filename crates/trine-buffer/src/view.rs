//! Schema materialised over a region.
//!
//! [`ObjectBufferView`] owns its schema and region handle and is the
//! thread-local working copy a producer mutates during a tick.
//! [`ReadView`] and [`WriteView`] borrow a triple-buffer slot for as long
//! as the flag register that selected it is borrowed, which keeps a view
//! consistent with its slot's role.

use std::sync::Arc;

use trine_core::Element;

use crate::error::{BufferError, ViewError};
use crate::region::SharedRegion;
use crate::schema::{FieldKey, Schema};
use crate::span::{ReadSpan, Span};

fn check_fits(schema: &Schema, region: &SharedRegion) -> Result<(), BufferError> {
    if region.len() < schema.size_of() {
        return Err(BufferError::BufferTooSmall {
            schema: schema.name().to_string(),
            required: schema.size_of(),
            available: region.len(),
        });
    }
    Ok(())
}

/// Typed field access over one region through a compiled schema.
///
/// Mutations through spans write the region in place; no copy is made.
#[derive(Clone, Debug)]
pub struct ObjectBufferView {
    schema: Arc<Schema>,
    region: SharedRegion,
}

impl ObjectBufferView {
    /// Allocate a zeroed region of exactly `schema.size_of()` bytes.
    pub fn new(schema: Arc<Schema>) -> Self {
        let region = SharedRegion::new(schema.size_of());
        Self { schema, region }
    }

    /// Materialise `schema` over an existing region.
    ///
    /// Fails with [`BufferError::BufferTooSmall`] if the region is shorter
    /// than the schema.
    pub fn over(schema: Arc<Schema>, region: SharedRegion) -> Result<Self, BufferError> {
        check_fits(&schema, &region)?;
        Ok(Self { schema, region })
    }

    /// The compiled schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The backing region.
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Writable span of field `name`.
    pub fn span<T: Element>(&self, name: &str) -> Result<Span<'_, T>, ViewError> {
        let layout = self.schema.resolve::<T>(name)?;
        Ok(Span::new(&self.region, layout.offset, layout.count))
    }

    /// Writable span of a pre-resolved field.
    pub fn span_at<T: Element>(&self, key: FieldKey<T>) -> Result<Span<'_, T>, ViewError> {
        self.schema.check_key(&key)?;
        Ok(Span::new(&self.region, key.offset, key.count))
    }

    /// Read-only span of field `name`.
    pub fn read<T: Element>(&self, name: &str) -> Result<ReadSpan<'_, T>, ViewError> {
        self.span(name).map(|s| s.as_read())
    }

    /// Read-only view of this working copy.
    pub fn as_read(&self) -> ReadView<'_> {
        ReadView::new(&self.schema, &self.region)
    }

    /// Overwrite this view with the content of `other`.
    ///
    /// Both views must share the same compiled schema.
    pub fn copy_from(&self, other: &ReadView<'_>) -> Result<(), ViewError> {
        if other.schema.id() != self.schema.id() {
            return Err(ViewError::SchemaMismatch {
                expected: self.schema.name().to_string(),
                actual: other.schema.name().to_string(),
            });
        }
        let len = self.schema.size_of();
        let mut bytes = vec![0u8; len];
        other.region.read_bytes(0, &mut bytes);
        self.region.write_bytes(0, &bytes);
        Ok(())
    }

    /// Zero every field.
    pub fn clear(&self) {
        self.region.fill_range(0..self.schema.size_of(), 0);
    }
}

/// Read-only view of a published triple-buffer slot.
#[derive(Clone, Copy, Debug)]
pub struct ReadView<'a> {
    schema: &'a Schema,
    region: &'a SharedRegion,
}

impl<'a> ReadView<'a> {
    pub(crate) fn new(schema: &'a Schema, region: &'a SharedRegion) -> Self {
        debug_assert!(region.len() >= schema.size_of());
        Self { schema, region }
    }

    /// The compiled schema.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Read-only span of field `name`.
    pub fn span<T: Element>(&self, name: &str) -> Result<ReadSpan<'a, T>, ViewError> {
        let layout = self.schema.resolve::<T>(name)?;
        Ok(ReadSpan::new(self.region, layout.offset, layout.count))
    }

    /// Read-only span of a pre-resolved field.
    pub fn span_at<T: Element>(&self, key: FieldKey<T>) -> Result<ReadSpan<'a, T>, ViewError> {
        self.schema.check_key(&key)?;
        Ok(ReadSpan::new(self.region, key.offset, key.count))
    }

    /// Copy the slot's bytes out.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.schema.size_of()];
        self.region.read_bytes(0, &mut out);
        out
    }
}

/// Writable view of the current write slot.
#[derive(Clone, Copy, Debug)]
pub struct WriteView<'a> {
    schema: &'a Schema,
    region: &'a SharedRegion,
}

impl<'a> WriteView<'a> {
    pub(crate) fn new(schema: &'a Schema, region: &'a SharedRegion) -> Self {
        debug_assert!(region.len() >= schema.size_of());
        Self { schema, region }
    }

    /// The compiled schema.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Writable span of field `name`.
    pub fn span<T: Element>(&self, name: &str) -> Result<Span<'a, T>, ViewError> {
        let layout = self.schema.resolve::<T>(name)?;
        Ok(Span::new(self.region, layout.offset, layout.count))
    }

    /// Writable span of a pre-resolved field.
    pub fn span_at<T: Element>(&self, key: FieldKey<T>) -> Result<Span<'a, T>, ViewError> {
        self.schema.check_key(&key)?;
        Ok(Span::new(self.region, key.offset, key.count))
    }
}
