//! Reusable schema fixtures.
//!
//! - [`health_schema`]: a single `hp: u32`.
//! - [`pair_schema`]: `a: u64` and `b: u64`, written equal by producers so
//!   consumers can detect torn frames.
//! - [`transform_schema`]: position/rotation/scale of a fixed number of
//!   renderables plus a `U32` resource id per renderable.

use std::sync::Arc;

use trine_buffer::Schema;
use trine_core::ElementType;

pub fn health_schema() -> Arc<Schema> {
    Schema::builder("health")
        .field("hp", ElementType::U32, 1)
        .build()
        .expect("health schema is valid")
}

pub fn pair_schema() -> Arc<Schema> {
    Schema::builder("pair")
        .field("a", ElementType::U64, 1)
        .field("b", ElementType::U64, 1)
        .build()
        .expect("pair schema is valid")
}

pub fn transform_schema(renderables: usize) -> Arc<Schema> {
    Schema::builder("transform")
        .field("position", ElementType::F32, renderables * 3)
        .field("quaternion", ElementType::F32, renderables * 4)
        .field("scale", ElementType::F32, renderables * 3)
        .field("mesh", ElementType::U32, renderables)
        .field("visible", ElementType::U8, renderables)
        .build()
        .expect("transform schema is valid")
}
