//! Test utilities for Trine development.
//!
//! Provides the schemas used across the workspace's tests and a
//! [`BufferGroup`] scaffold bundling a flag register with its writer.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::Arc;

use trine_buffer::{FlagReader, FlagWriter, ObjectTripleBuffer, Schema, TripleBufferFlags};

pub use fixtures::{health_schema, pair_schema, transform_schema};

/// A flag register, its writer, and the buffers created in its group.
pub struct BufferGroup {
    pub flags: TripleBufferFlags,
    pub writer: FlagWriter,
    pub buffers: Vec<ObjectTripleBuffer>,
}

impl BufferGroup {
    pub fn new(max_readers: usize) -> Self {
        let (flags, writer) = TripleBufferFlags::new(max_readers);
        Self {
            flags,
            writer,
            buffers: Vec::new(),
        }
    }

    /// Add a buffer for `schema` to the group and return a handle to it.
    pub fn add(&mut self, schema: Arc<Schema>) -> ObjectTripleBuffer {
        let otb = ObjectTripleBuffer::new(schema, &self.flags);
        self.buffers.push(otb.clone());
        otb
    }

    /// Claim a reader, panicking if capacity is exhausted.
    pub fn reader(&self) -> FlagReader {
        self.flags
            .reader()
            .expect("flag register has no free reader slot")
    }
}
