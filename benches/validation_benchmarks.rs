use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_analytics::validation::{check_containment, check_partition, validate_results, ResultSet};
use graph_analytics::{AlgorithmKind, AnalysisConfiguration, AnalysisRun, DeploymentMode, ExecutionMetrics, RunStatus};
use graph_engine_client::ResultDocument;
use std::time::Duration;

fn sample(size: usize, components: usize) -> Vec<ResultDocument> {
    (0..size)
        .map(|i| {
            let collection = if i % 2 == 0 { "users" } else { "accounts" };
            ResultDocument::new(format!("{}/{}", collection, i)).with_field("component", format!("c{}", i % components))
        })
        .collect()
}

fn wcc_config() -> AnalysisConfiguration {
    AnalysisConfiguration::builder("components", AlgorithmKind::Wcc)
        .vertex_collections(["users", "accounts"])
        .target_collection("results")
        .build()
        .expect("valid configuration")
}

/// Full validation over growing samples
fn bench_validate_results(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_results");
    let config = wcc_config();

    for size in [100, 1000, 10_000].iter() {
        let docs = sample(*size, 10);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let results = ResultSet { sample: &docs, distinct_values: Some(10), vertex_count: size as u64 };
                criterion::black_box(validate_results(&config, &results));
            });
        });
    }
    group.finish();
}

/// Partition check without a server-side distinct count
fn bench_partition_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_fallback");

    for size in [100, 1000, 10_000].iter() {
        let docs = sample(*size, *size / 4);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let results = ResultSet { sample: &docs, distinct_values: None, vertex_count: size as u64 };
                criterion::black_box(check_partition(AlgorithmKind::Wcc, "component", &results).is_ok());
            });
        });
    }
    group.finish();
}

fn bench_containment(c: &mut Criterion) {
    let config = wcc_config();
    let docs = sample(10_000, 10);
    c.bench_function("containment_10k", |b| {
        b.iter(|| {
            let results = ResultSet { sample: &docs, distinct_values: None, vertex_count: 10_000 };
            criterion::black_box(check_containment(config.vertex_collections(), &results).is_ok());
        });
    });
}

/// Metrics aggregation over many finished runs
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_aggregate");
    let config = wcc_config();

    for count in [10, 100, 1000].iter() {
        let runs: Vec<AnalysisRun> = (0..*count)
            .map(|i| {
                let mut run = AnalysisRun::new(&config, DeploymentMode::Managed);
                run.status = if i % 10 == 0 { RunStatus::Failed } else { RunStatus::Completed };
                run.load_time = Some(Duration::from_millis(200 + i as u64));
                run.execution_time = Some(Duration::from_secs(2));
                run.vertex_count = 10_000;
                run.edge_count = 50_000;
                run.estimated_cost_usd = 0.1;
                run
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &runs, |b, runs| {
            b.iter(|| criterion::black_box(ExecutionMetrics::aggregate(runs)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_validate_results, bench_partition_fallback, bench_containment, bench_metrics);
criterion_main!(benches);
