//! Store synchronization benchmarks
//!
//! - `update_to` / `init_from` against the in-memory store
//! - File store round trip (open, update, close)
//! - Fluctuation draws as run once per toy set

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fitflow::kv::{FileStore, MemoryStore, OpenMode};
use fitflow::param::{AliasMap, Parameter, ParameterSet};
use fitflow::sync::{fluctuate_from, init_from, update_to, update_to_file};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Parameter set with `n` fully specified parameters
#[allow(clippy::cast_precision_loss)]
fn create_params(n: usize) -> ParameterSet {
    (0..n)
        .map(|i| {
            let v = i as f64 * 0.01;
            Parameter::builder(format!("p{i}"), v)
                .error(0.05)
                .asym_error(-0.04, 0.06)
                .constant(false)
                .range(v - 1.0, v + 1.0)
                .build()
        })
        .collect()
}

/// Benchmark update + init through the in-memory store
fn bench_memory_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_round_trip");
    let aliases = AliasMap::new();

    for size in [10, 100, 1_000].iter() {
        let params = create_params(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut store = MemoryStore::with_capacity(*size);
                update_to(&mut store, &params, &aliases).unwrap();
                let mut restored = params.clone();
                let report = init_from(&store, &mut restored, &aliases).unwrap();
                black_box(report);
            });
        });
    }

    group.finish();
}

/// Benchmark update_to on a store file
fn bench_file_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_update");
    let dir = tempfile::tempdir().unwrap();
    let aliases = AliasMap::new();

    for size in [10, 100, 1_000].iter() {
        let params = create_params(*size);
        let path = dir.path().join(format!("fitResults_{size}.db"));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let report = update_to_file(&path, &params, &aliases).unwrap();
                black_box(report);
            });
        });

        let store = FileStore::open(&path, OpenMode::Read).unwrap();
        black_box(store.len());
    }

    group.finish();
}

/// Benchmark fluctuation of a full parameter set
fn bench_fluctuation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fluctuation");
    let aliases = AliasMap::new();

    for size in [10, 100, 1_000].iter() {
        let params = create_params(*size);
        let mut store = MemoryStore::new();
        update_to(&mut store, &params, &aliases).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let mut work = params.clone();
            b.iter(|| {
                fluctuate_from(&store, &mut work, &aliases, &mut rng).unwrap();
                black_box(&work);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_memory_round_trip, bench_file_update, bench_fluctuation);
criterion_main!(benches);
