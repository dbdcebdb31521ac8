//! Criterion micro-benchmarks for the triple-buffer hand-off.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use trine_bench::{fill_transforms, frame_profile, REFERENCE_RENDERABLES};

/// Write the reference scene into the local view.
fn bench_fill(c: &mut Criterion) {
    let profile = frame_profile(REFERENCE_RENDERABLES);
    let local = profile.buffer.local_view();
    let mut frame = 0u32;
    c.bench_function("fill_transforms_1k", |b| {
        b.iter(|| {
            frame = frame.wrapping_add(1);
            fill_transforms(&local, black_box(frame)).unwrap();
        });
    });
}

/// Copy the local view into the write slot and publish.
fn bench_commit_and_swap(c: &mut Criterion) {
    let mut profile = frame_profile(REFERENCE_RENDERABLES);
    let local = profile.buffer.local_view();
    fill_transforms(&local, 1).unwrap();
    c.bench_function("commit_and_swap_1k", |b| {
        b.iter(|| {
            let outcome = profile
                .buffer
                .commit_and_swap(&mut profile.writer, &local)
                .unwrap();
            black_box(outcome);
        });
    });
}

/// Flag-only swaps with no payload copy.
fn bench_flag_swaps(c: &mut Criterion) {
    let mut profile = frame_profile(1);
    c.bench_function("swap_write_then_read", |b| {
        b.iter(|| {
            black_box(profile.writer.swap_write_buffer_flags());
            black_box(profile.reader.swap_read_buffer_flags());
        });
    });
}

/// Validated read of one field after a fresh publish.
fn bench_read_with(c: &mut Criterion) {
    let mut profile = frame_profile(REFERENCE_RENDERABLES);
    let local = profile.buffer.local_view();
    fill_transforms(&local, 1).unwrap();
    profile
        .buffer
        .commit_and_swap(&mut profile.writer, &local)
        .unwrap();
    c.bench_function("read_with_positions_1k", |b| {
        b.iter(|| {
            let sum = profile
                .buffer
                .read_with(&mut profile.reader, |view| {
                    view.span::<f32>("position").unwrap().iter().sum::<f32>()
                })
                .unwrap();
            black_box(sum);
        });
    });
}

criterion_group!(
    benches,
    bench_fill,
    bench_commit_and_swap,
    bench_flag_swaps,
    bench_read_with
);
criterion_main!(benches);
