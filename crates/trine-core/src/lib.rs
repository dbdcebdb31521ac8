//! Core types for the Trine cross-thread state synchronization crates.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! identifiers passed between execution units and the element types that
//! buffer schemas are declared in.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod element;
pub mod id;

pub use element::{Element, ElementType};
pub use id::{Generation, ResourceId, ResourceIdAllocator, ResourceKind, TickId, UnitId};
