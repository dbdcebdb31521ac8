//! Schema-typed shared regions and the triple-buffer hand-off protocol.
//!
//! Layers, leaf first:
//!
//! - [`SharedRegion`]: fixed-length shared bytes.
//! - [`CursorBuffer`]: bump allocator of typed [`Span`]s over a region.
//! - [`Schema`] / [`ObjectBufferView`]: a layout compiled once and
//!   materialised over any region large enough to hold it.
//! - [`TripleBufferFlags`], [`FlagWriter`], [`FlagReader`]: the lock-free
//!   slot rotation shared by a group of buffers.
//! - [`TripleBuffer`] / [`ObjectTripleBuffer`]: three slots per buffer,
//!   committed by the single writer and read by any number of consumers.
//!
//! ```
//! use trine_buffer::{ObjectTripleBuffer, Schema, TripleBufferFlags};
//! use trine_core::ElementType;
//!
//! let schema = Schema::builder("health")
//!     .field("hp", ElementType::U32, 1)
//!     .build()
//!     .unwrap();
//! let (flags, mut writer) = TripleBufferFlags::new(1);
//! let otb = ObjectTripleBuffer::new(schema, &flags);
//! let mut reader = flags.reader().unwrap();
//!
//! let local = otb.local_view();
//! local.span::<u32>("hp").unwrap().set(0, 42);
//! otb.commit_and_swap(&mut writer, &local).unwrap();
//!
//! let hp = otb
//!     .read_with(&mut reader, |view| view.span::<u32>("hp").unwrap().get(0))
//!     .unwrap();
//! assert_eq!(hp, 42);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cursor;
pub mod error;
pub mod flags;
pub mod object_triple;
pub mod region;
pub mod schema;
pub mod span;
pub mod triple;
pub mod view;

pub use cursor::CursorBuffer;
pub use error::{BufferError, ReadError, SchemaError, ViewError};
pub use flags::{FlagReader, FlagWriter, FlagsId, ReadSwap, SwapOutcome, TripleBufferFlags};
pub use object_triple::ObjectTripleBuffer;
pub use region::SharedRegion;
pub use schema::{FieldKey, FieldLayout, Schema, SchemaBuilder, SchemaId};
pub use span::{ReadSpan, Span};
pub use triple::TripleBuffer;
pub use view::{ObjectBufferView, ReadView, WriteView};
