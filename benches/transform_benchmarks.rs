/// Performance benchmarks for track transforms and pruning
///
/// Run with: cargo bench
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use trackops::cluster::{EquivalencePolicy, KeepPolicy};
use trackops::condition::{BaseComparison, PositionCondition};
use trackops::operand::Operand;
use trackops::operations::{Arithmetic, PruneRequest};
use trackops::synthetic::{generate, SyntheticSpec};
use trackops::{CancellationToken, DataStore, Engine, EngineConfig, TransformRequest};

fn dataset(length: usize) -> DataStore {
    generate(&SyntheticSpec {
        sequences: 16,
        length,
        ..SyntheticSpec::default()
    })
    .unwrap()
}

/// Numeric transform gated by a per-position base condition
fn bench_numeric_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeric_transform");
    group.sample_size(10);

    for threads in [1, 4] {
        let engine = Engine::new(EngineConfig::default().with_threads(threads).quiet()).unwrap();
        let request = TransformRequest::new("conservation", Operand::Map("gc_offset".into()))
            .into_target("adjusted")
            .where_(PositionCondition::base(
                "DNA",
                BaseComparison::IsUppercase,
                None,
                false,
            ));
        group.throughput(Throughput::Elements(16 * 20_000));
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, _| {
            b.iter_with_setup(
                || dataset(20_000),
                |mut store| {
                    let outcome = engine
                        .transform(
                            &mut store,
                            &request,
                            &Arithmetic::Increase,
                            &CancellationToken::new(),
                        )
                        .unwrap();
                    black_box(outcome)
                },
            )
        });
    }
    group.finish();
}

/// Region pruning under each equivalence policy
fn bench_prune_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");
    group.sample_size(10);
    let engine = Engine::new(EngineConfig::default().with_threads(4).quiet()).unwrap();

    for policy in [
        EquivalencePolicy::Duplicates,
        EquivalencePolicy::Similar,
        EquivalencePolicy::AlternativesOptimal,
    ] {
        let request = PruneRequest::new("sites", policy, KeepPolicy::HighestIc)
            .with_partition("families")
            .into_target("pruned");
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter_with_setup(
                || dataset(50_000),
                |mut store| {
                    let outcome = request
                        .run(&engine, &mut store, &CancellationToken::new())
                        .unwrap();
                    black_box(outcome)
                },
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_numeric_transform, bench_prune_policies);
criterion_main!(benches);
