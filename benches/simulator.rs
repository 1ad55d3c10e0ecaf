//! Criterion benchmarks for the simulator.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use seqattn::assays::run_batch;
use seqattn::config::ModelConfig;
use seqattn::tasks::Variant;

/// Benchmark step() for every task variant.
fn bench_step_variants(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_variant");
    group.throughput(Throughput::Elements(1));

    for variant in Variant::ALL {
        let cfg = variant.default_config();
        let task = variant.build(&cfg).expect("default config builds");
        group.bench_function(variant.name(), |b| {
            let mut sim = task.simulator();
            b.iter(|| {
                sim.step();
                black_box(sim.value(task.evidence)[0])
            });
        });
    }

    group.finish();
}

/// Benchmark step() of the sequential task with growing pointer dimensions.
fn bench_step_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_dimensions");

    for dims in [16usize, 64, 256, 512] {
        let cfg = ModelConfig {
            dimensions: dims,
            ..ModelConfig::default()
        };
        let task = Variant::Sequential.build(&cfg).expect("config builds");
        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::new("sequential", dims), &dims, |b, _| {
            let mut sim = task.simulator();
            b.iter(|| {
                sim.step();
                black_box(sim.value(task.evidence)[0])
            });
        });
    }

    group.finish();
}

/// A full two-second trial, and a small batch of them.
fn bench_trials(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial");
    group.sample_size(10);

    let cfg = ModelConfig::default();
    let task = Variant::Sequential.build(&cfg).expect("default config builds");
    group.bench_function("sequential_2s", |b| {
        b.iter(|| black_box(task.run().response))
    });

    let words = vec![
        vec!["C".to_string(), "B".to_string()],
        vec!["H".to_string(), "B".to_string()],
        vec!["D".to_string(), "J".to_string()],
    ];
    group.bench_function("batch_3x4", |b| {
        b.iter(|| black_box(run_batch(&cfg, &words, &[1, 2, 3, 4]).map(|r| r.len())))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_step_variants,
    bench_step_dimensions,
    bench_trials
);
criterion_main!(benches);
