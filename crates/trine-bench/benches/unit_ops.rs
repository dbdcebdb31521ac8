//! Criterion benchmarks for the unit tick pipeline and inbox.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use trine_bench::{pipeline_unit, REFERENCE_RENDERABLES};

/// A full tick: reader swaps, 16 chained systems, transform write, commit.
fn bench_tick(c: &mut Criterion) {
    let (mut unit, _reader, _buffer) = pipeline_unit(REFERENCE_RENDERABLES, 16).unwrap();
    c.bench_function("tick_1k_renderables_16_systems", |b| {
        b.iter(|| black_box(unit.tick().unwrap()));
    });
}

/// Scheduling overhead alone.
fn bench_empty_tick(c: &mut Criterion) {
    let (mut unit, _reader, _buffer) = pipeline_unit(1, 0).unwrap();
    c.bench_function("tick_minimal", |b| {
        b.iter(|| black_box(unit.tick().unwrap()));
    });
}

/// Post and drain 256 messages.
fn bench_pump(c: &mut Criterion) {
    let (mut unit, _reader, _buffer) = pipeline_unit(1, 0).unwrap();
    let port = unit.port();
    c.bench_function("post_and_pump_256", |b| {
        b.iter(|| {
            for _ in 0..256 {
                port.post(()).unwrap();
            }
            black_box(unit.pump());
        });
    });
}

criterion_group!(benches, bench_tick, bench_empty_tick, bench_pump);
criterion_main!(benches);
