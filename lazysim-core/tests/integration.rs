//! Integration Tests for the Lazy-Slice Engine
//!
//! These tests build small models end to end and check that data is
//! generated lazily, cached, overridden, persisted and reset correctly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use lazysim_core::executor::{wait_first, Executor, LocalExecutor, SpawningExecutor};
use lazysim_core::ops::{Constant, Discrepancy, Simulator, Summary, Threshold};
use lazysim_core::store::{MemoryStore, Preallocated, SinkStore, Store};
use lazysim_core::{Array, Deferred, Graph, NodeId, OperationId, WithValues};

fn chunk_sizes(graph: &Graph, id: NodeId) -> Vec<usize> {
    graph
        .cache(id)
        .unwrap()
        .chunks()
        .iter()
        .map(|chunk| chunk.key.len())
        .collect()
}

fn abs_distance() -> Discrepancy {
    Discrepancy::sequential(|rows, observed| (rows[0].values()[0] - observed[0].values()[0]).abs())
}

/// A constant is repeated per sample and generated in the requested batches.
#[test]
fn constant_in_batches_of_two() {
    let mut graph = Graph::new("scenario_a");
    let c = graph.add_operation("c", &[], Constant::new(3.0)).unwrap();

    let out = graph.acquire(c, 5, 0, Some(2)).unwrap();
    let data = graph.compute(&out).unwrap();

    assert_eq!(data.shape(), &[5, 1]);
    assert!(data.values().iter().all(|&v| v == 3.0));
    assert_eq!(chunk_sizes(&graph, c), vec![2, 2, 1]);
}

/// Simulator -> summary -> discrepancy -> threshold.
#[test]
fn rejection_pipeline() {
    let mut graph = Graph::new("scenario_b");
    let sim = graph
        .add_operation(
            "sim",
            &[],
            Simulator::batched(|_, n, _| Array::full(&[n, 1], 1.0)).with_observed(0.0),
        )
        .unwrap();
    let summary = graph
        .add_operation("summary", &[sim], Summary::batched(|data| data[0].clone()))
        .unwrap();
    let d = graph.add_operation("d", &[summary], abs_distance()).unwrap();

    // The summary inherits the simulator's observed value.
    assert_eq!(graph.observed(summary).unwrap().unwrap().values(), &[0.0]);

    let distances = graph.acquire(d, 10, 0, Some(4)).unwrap();
    let distances = graph.compute(&distances).unwrap();
    assert_eq!(distances.shape(), &[10, 1]);
    assert!(distances.values().iter().all(|&v| v == 1.0));
    assert_eq!(chunk_sizes(&graph, d), vec![4, 4, 2]);

    let accepted = graph.add_operation("accepted", &[d], Threshold::new(0.5)).unwrap();
    let accepted = graph.acquire(accepted, 10, 0, None).unwrap();
    assert!(graph
        .compute(&accepted)
        .unwrap()
        .values()
        .iter()
        .all(|&v| v == 0.0));
}

/// Overridden nodes yield the given values; their siblings still compute.
#[test]
fn with_values_override() {
    let mut graph = Graph::new("g");
    let x = graph
        .add_operation("x", &[], Simulator::batched(|_, n, _| Array::full(&[n, 1], 1.0)).with_observed(0.0))
        .unwrap();
    let y = graph
        .add_operation("y", &[], Simulator::batched(|_, n, _| Array::full(&[n, 1], 2.0)).with_observed(0.0))
        .unwrap();
    let both = graph
        .add_operation(
            "both",
            &[x, y],
            Summary::sequential(|rows| Array::vector(vec![rows[0].values()[0], rows[1].values()[0]])),
        )
        .unwrap();

    let mut values = WithValues::new();
    values.insert("x".into(), Array::vector(vec![7.0, 8.0, 9.0]));
    graph.generate(both, 3, Some(2), Some(&values)).unwrap();

    let x_out = graph.acquire(x, 3, 0, None).unwrap();
    assert_eq!(graph.compute(&x_out).unwrap().values(), &[7.0, 8.0, 9.0]);
    let y_out = graph.acquire(y, 3, 0, None).unwrap();
    assert_eq!(graph.compute(&y_out).unwrap().values(), &[2.0, 2.0, 2.0]);
    let both_out = graph.acquire(both, 3, 0, None).unwrap();
    assert_eq!(
        graph.compute(&both_out).unwrap().values(),
        &[7.0, 2.0, 8.0, 2.0, 9.0, 2.0]
    );

    // Later samples are computed again.
    let more = graph.acquire(x, 1, 3, None).unwrap();
    assert_eq!(graph.compute(&more).unwrap().values(), &[1.0]);
}

/// Reading a generated range twice runs the simulator once.
#[test]
fn slices_are_not_recomputed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut graph = Graph::new("g").with_executor(Arc::new(LocalExecutor::lazy()));
    let sim = graph
        .add_operation(
            "sim",
            &[],
            Simulator::batched(move |_, n, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Array::full(&[n, 1], 0.5)
            })
            .with_observed(0.0),
        )
        .unwrap();

    let first = graph.get_slice(sim, 0..6, None).unwrap();
    let second = graph.get_slice(sim, 2..6, None).unwrap();
    assert_eq!(graph.compute(&first).unwrap().nrows(), 6);
    assert_eq!(graph.compute(&second).unwrap().nrows(), 4);
    assert_eq!(graph.compute(&first).unwrap().nrows(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// The same seed and batching give the same random data.
#[test]
fn random_data_is_reproducible() {
    fn run(seed: u64) -> Array {
        let mut graph = Graph::new("g").with_seed(seed);
        let sim = graph
            .add_operation(
                "sim",
                &[],
                Simulator::batched(|_, n, rng| {
                    Array::column((0..n).map(|_| rng.gen::<f64>()).collect())
                })
                .with_observed(0.0),
            )
            .unwrap();
        let out = graph.acquire(sim, 8, 0, Some(3)).unwrap();
        graph.compute(&out).unwrap()
    }

    let a = run(11);
    assert_eq!(a, run(11));
    assert_ne!(a, run(12));

    // Chunks draw from distinct sub-streams.
    assert_ne!(a.rows(0..3).unwrap(), a.rows(3..6).unwrap());
}

/// Persisted chunks are read back from the store and dropped on reset.
#[test]
fn memory_store_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let mut graph = Graph::new("g").with_default_store(store.clone());
    let c = graph.add_operation("c", &[], Constant::new(2.0)).unwrap();
    let s = graph
        .add_operation("s", &[c], Summary::batched(|data| data[0].map(|v| v * 10.0)))
        .unwrap();

    let out = graph.acquire(s, 4, 0, Some(2)).unwrap();
    let old = graph.operation_id(s).unwrap();
    assert_eq!(store.chunk_count(&old), 2);
    assert!(matches!(out, Deferred::Concat(ref parts) if parts.iter().all(|p| matches!(p, Deferred::Stored { .. }))));
    assert_eq!(graph.compute(&out).unwrap().values(), &[20.0; 4]);

    graph.reset(c, true).unwrap();
    for id in [c, s] {
        assert_eq!(graph.generated_len(id).unwrap(), 0);
        assert_eq!(graph.version(id).unwrap(), 1);
    }
    assert_eq!(graph.operation_id(s).unwrap(), OperationId::new("g", "s", 1));
    assert_eq!(store.chunk_count(&old), 0);
    assert!(store.read(&old, 0..4).is_err());

    let again = graph.acquire(s, 1, 0, None).unwrap();
    assert_eq!(graph.compute(&again).unwrap().values(), &[20.0]);
}

/// Operations can persist to a preallocated sink instead of the default store.
#[test]
fn preallocated_sink_store() {
    let store: Arc<dyn Store> = Arc::new(SinkStore::new(|_: &OperationId| Preallocated::new(16, &[1])));
    let mut graph = Graph::new("g");
    let c = graph
        .add_operation(
            "c",
            &[],
            lazysim_core::OperationSpec::from(Constant::new(4.0)).with_store(store.clone()),
        )
        .unwrap();

    let out = graph.acquire(c, 5, 0, Some(3)).unwrap();
    assert_eq!(graph.compute(&out).unwrap().values(), &[4.0; 5]);
    let id = graph.operation_id(c).unwrap();
    assert_eq!(store.read(&id, 2..4).unwrap().values(), &[4.0, 4.0]);

    // Capacity is exceeded: the write fails and nothing is appended.
    assert!(graph.acquire(c, 12, 5, None).is_err());
    assert_eq!(graph.cache(c).unwrap().len(), 5);
    assert_eq!(graph.generated_len(c).unwrap(), 5);
    let again = graph.acquire(c, 5, 0, None).unwrap();
    assert_eq!(graph.compute(&again).unwrap().values(), &[4.0; 5]);
}

/// Replacing a node rewires its children and resets them.
#[test]
fn change_to_swaps_observed_holder() {
    let mut graph = Graph::new("g");
    let data = graph.add_operation("data", &[], Constant::new(1.0)).unwrap();
    let d = graph.add_operation("d", &[data], abs_distance()).unwrap();
    let before = graph.acquire(d, 2, 0, None).unwrap();
    assert_eq!(graph.compute(&before).unwrap().values(), &[0.0, 0.0]);

    let sim = graph
        .add_operation("sim", &[], Simulator::batched(|_, n, _| Array::full(&[n, 1], 3.0)).with_observed(1.0))
        .unwrap();
    graph.change_to(data, sim, true, true).unwrap();

    assert_eq!(graph.node(d).unwrap().parents(), &[sim]);
    assert_eq!(graph.generated_len(d).unwrap(), 0);
    let after = graph.acquire(d, 2, 0, None).unwrap();
    assert_eq!(graph.compute(&after).unwrap().values(), &[2.0, 2.0]);
}

/// Failing user functions leave the cache untouched.
#[test]
fn shape_contract_violation() {
    let mut graph = Graph::new("g");
    let bad = graph
        .add_operation("bad", &[], Simulator::batched(|_, n, _| Array::vector(vec![0.0; n])).with_observed(0.0))
        .unwrap();
    let err = graph.acquire(bad, 3, 0, None).unwrap_err();
    assert!(matches!(err, lazysim_core::Error::ShapeContract { expected: 3, .. }));
    assert_eq!(graph.cache(bad).unwrap().len(), 0);
    assert_eq!(graph.generated_len(bad).unwrap(), 0);
}

/// Pipelined evaluation on a tokio runtime.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawning_executor_pipeline() {
    let executor = Arc::new(SpawningExecutor::current().unwrap());
    let mut graph = Graph::new("g").with_seed(5).with_executor(executor.clone());
    let sim = graph
        .add_operation(
            "sim",
            &[],
            Simulator::batched(|_, n, rng| Array::column((0..n).map(|_| rng.gen_range(0.0..1.0)).collect()))
                .with_observed(0.5),
        )
        .unwrap();
    let d = graph.add_operation("d", &[sim], abs_distance()).unwrap();

    let batches: Vec<Deferred> = (0..3)
        .map(|i| graph.acquire(d, 4, i * 4, None).unwrap())
        .collect();
    let mut pending: Vec<_> = batches.into_iter().map(|b| executor.submit(b)).collect();

    let mut seen = 0;
    while let Some(done) = wait_first(pending).await {
        let data = done.result.unwrap();
        assert_eq!(data.shape(), &[4, 1]);
        assert!(data.values().iter().all(|&v| (0.0..=0.5).contains(&v)));
        assert!(done.key.is_some());
        seen += 1;
        pending = done.remaining;
    }
    assert_eq!(seen, 3);
}
