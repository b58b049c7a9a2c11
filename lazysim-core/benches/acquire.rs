//! # Acquisition Benchmarks
//!
//! Incremental sample acquisition through a small rejection model.
//!
//! Run with: `cargo bench -p lazysim-core`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lazysim_core::ops::{Constant, Discrepancy, Simulator, Threshold};
use lazysim_core::{Array, Graph, NodeId};
use rand::Rng;
use std::hint::black_box;

/// mu -> sim -> distance -> accepted
fn build_model() -> (Graph, NodeId) {
    let mut graph = Graph::new("bench").with_seed(1);
    let mu = graph.add_operation("mu", &[], Constant::new(0.0)).expect("mu");
    let sim = graph
        .add_operation(
            "sim",
            &[mu],
            Simulator::batched(|data, n, rng| {
                let values = data[0]
                    .values()
                    .iter()
                    .take(n)
                    .map(|v| v + rng.gen_range(-1.0..1.0))
                    .collect();
                Array::column(values)
            }),
        )
        .expect("sim");
    let distance = graph
        .add_operation(
            "distance",
            &[sim],
            Discrepancy::sequential(|rows, observed| {
                (rows[0].values()[0] - observed[0].values()[0]).abs()
            }),
        )
        .expect("distance");
    let accepted = graph
        .add_operation("accepted", &[distance], Threshold::new(0.5))
        .expect("accepted");
    (graph, accepted)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire");

    for batch in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                let (mut graph, accepted) = build_model();
                let out = graph.acquire(accepted, 1000, 0, Some(batch)).expect("acquire");
                black_box(graph.compute(&out).expect("compute"))
            });
        });
    }

    group.finish();
}

fn bench_cached_reads(c: &mut Criterion) {
    let (mut graph, accepted) = build_model();
    graph.acquire(accepted, 1000, 0, Some(100)).expect("acquire");

    c.bench_function("cached_slice", |b| {
        b.iter(|| {
            let out = graph.get_slice(accepted, 250..750, None).expect("slice");
            black_box(graph.compute(&out).expect("compute"))
        });
    });
}

criterion_group!(benches, bench_acquire, bench_cached_reads);
criterion_main!(benches);
