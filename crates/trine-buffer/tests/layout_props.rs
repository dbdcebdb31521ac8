//! Property tests for schema views over arbitrary regions.

use proptest::prelude::*;
use trine_buffer::{BufferError, ObjectBufferView, Schema, SharedRegion};
use trine_core::ElementType;

fn element_type() -> impl Strategy<Value = ElementType> {
    proptest::sample::select(ElementType::ALL.to_vec())
}

fn schema_decl() -> impl Strategy<Value = Vec<(ElementType, usize)>> {
    proptest::collection::vec((element_type(), 1usize..6), 1..10)
}

fn build(decl: &[(ElementType, usize)]) -> std::sync::Arc<Schema> {
    decl.iter()
        .enumerate()
        .fold(Schema::builder("generated"), |b, (i, (ty, count))| {
            b.field(format!("f{i}"), *ty, *count)
        })
        .build()
        .unwrap()
}

fn field_range(view: &ObjectBufferView, name: &str, ty: ElementType) -> (usize, usize) {
    macro_rules! range {
        ($t:ty) => {{
            let s = view.span::<$t>(name).unwrap();
            (s.byte_offset(), s.byte_offset() + s.byte_len())
        }};
    }
    match ty {
        ElementType::U8 => range!(u8),
        ElementType::I8 => range!(i8),
        ElementType::U16 => range!(u16),
        ElementType::I16 => range!(i16),
        ElementType::U32 => range!(u32),
        ElementType::I32 => range!(i32),
        ElementType::U64 => range!(u64),
        ElementType::I64 => range!(i64),
        ElementType::F32 => range!(f32),
        ElementType::F64 => range!(f64),
    }
}

proptest! {
    #[test]
    fn spans_lie_inside_region_without_overlap(decl in schema_decl(), extra in 0usize..32) {
        let schema = build(&decl);
        let region = SharedRegion::new(schema.size_of() + extra);
        let view = ObjectBufferView::over(schema.clone(), region.clone()).unwrap();
        let mut ranges: Vec<(usize, usize)> = decl
            .iter()
            .enumerate()
            .map(|(i, (ty, _))| field_range(&view, &format!("f{i}"), *ty))
            .collect();
        for &(start, end) in &ranges {
            prop_assert!(end <= region.len());
            prop_assert!(start <= end);
        }
        ranges.sort();
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "fields overlap: {:?}", pair);
        }
    }

    #[test]
    fn short_region_is_buffer_too_small(decl in schema_decl(), short in 1usize..8) {
        let schema = build(&decl);
        let len = schema.size_of().saturating_sub(short);
        let result = ObjectBufferView::over(schema.clone(), SharedRegion::new(len));
        prop_assert_eq!(
            result.unwrap_err(),
            BufferError::BufferTooSmall {
                schema: "generated".to_string(),
                required: schema.size_of(),
                available: len,
            }
        );
    }
}
