//! Error types for layout compilation, views, and the triple-buffer protocol.
//!
//! Layout errors ([`SchemaError`], [`BufferError::OutOfSpace`],
//! [`BufferError::BufferTooSmall`]) are construction-time configuration
//! defects. They are reported with enough context (schema name, required
//! and available bytes) to fix the declaration, and are never retried.

use thiserror::Error;
use trine_core::ElementType;

/// Errors raised while compiling a [`Schema`](crate::Schema).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema declares no fields.
    #[error("schema `{schema}` declares no fields")]
    NoFields {
        /// Schema name.
        schema: String,
    },
    /// A field was declared with an element count of zero.
    #[error("field `{field}` of schema `{schema}` has count 0")]
    ZeroCount {
        /// Schema name.
        schema: String,
        /// Offending field.
        field: String,
    },
    /// The same field name was declared twice.
    #[error("field `{field}` declared twice in schema `{schema}`")]
    DuplicateField {
        /// Schema name.
        schema: String,
        /// Offending field.
        field: String,
    },
    /// The compiled layout does not fit in `usize`.
    #[error("layout of schema `{schema}` overflows at field `{field}`")]
    SizeOverflow {
        /// Schema name.
        schema: String,
        /// Field whose end offset overflowed.
        field: String,
    },
}

/// Errors raised by regions, cursors, and triple buffers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A cursor allocation would run past the end of its region.
    #[error("out of space: {requested} bytes at offset {offset} exceed region of {capacity} bytes")]
    OutOfSpace {
        /// Bytes requested by the allocation.
        requested: usize,
        /// Aligned offset the allocation would start at.
        offset: usize,
        /// Length of the region.
        capacity: usize,
    },
    /// A view was requested over a region smaller than its schema.
    #[error("buffer too small for schema `{schema}`: {required} bytes required, {available} available")]
    BufferTooSmall {
        /// Schema name.
        schema: String,
        /// `size_of` the schema.
        required: usize,
        /// Length of the region offered.
        available: usize,
    },
    /// A copy source does not match the slot length.
    #[error("length mismatch: slot holds {expected} bytes, source has {actual}")]
    LengthMismatch {
        /// Slot length.
        expected: usize,
        /// Source length.
        actual: usize,
    },
    /// A local view compiled from a different schema was committed.
    #[error("schema mismatch: buffer holds `{expected}`, view is `{actual}`")]
    SchemaMismatch {
        /// Schema of the buffer.
        expected: String,
        /// Schema of the offered view.
        actual: String,
    },
    /// A flag register from a different buffer group was supplied.
    #[error("flag register does not govern this buffer")]
    ForeignFlags,
    /// Every reader slot of a flag register is claimed.
    #[error("flag register already serves its maximum of {max_readers} readers")]
    ReaderCapacity {
        /// Configured reader capacity.
        max_readers: usize,
    },
}

/// Errors raised when resolving schema fields through a view.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ViewError {
    /// No field with this name exists in the schema.
    #[error("schema `{schema}` has no field `{field}`")]
    UnknownField {
        /// Schema name.
        schema: String,
        /// Requested field.
        field: String,
    },
    /// The requested Rust type does not match the declared element type.
    #[error("field `{field}` holds {declared}, requested as {requested}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Element type in the schema.
        declared: ElementType,
        /// Element type of the requested Rust type.
        requested: ElementType,
    },
    /// A key or view from a different schema was used.
    #[error("schema mismatch: expected `{expected}`, got `{actual}`")]
    SchemaMismatch {
        /// Schema of the view.
        expected: String,
        /// Schema the key or source belongs to.
        actual: String,
    },
}

/// Errors raised by validated reads ([`TripleBuffer::read_with`](crate::TripleBuffer::read_with)).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The producer has not published a frame yet.
    #[error("nothing has been published yet")]
    NothingPublished,
    /// Every attempt overlapped a producer write into the pinned slot.
    #[error("read contended by producer after {attempts} attempts")]
    Contended {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The reader does not belong to the buffer's flag register.
    #[error("flag register does not govern this buffer")]
    ForeignFlags,
}
