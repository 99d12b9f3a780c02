//! Execution metrics
//!
//! Derived views over one or more finished `AnalysisRun`s for the reporting
//! layer. Aggregation is a pure function of its input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use graph_engine_client::AlgorithmKind;

use crate::orchestrator::{AnalysisRun, RunStatus};

/// Time spent per phase
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseTimes {
    #[serde(with = "humantime_serde")]
    pub deploy: Duration,
    #[serde(with = "humantime_serde")]
    pub load: Duration,
    #[serde(with = "humantime_serde")]
    pub execution: Duration,
    #[serde(with = "humantime_serde")]
    pub store: Duration,
    #[serde(with = "humantime_serde")]
    pub validation: Duration,
}

impl PhaseTimes {
    pub fn total(&self) -> Duration {
        self.deploy + self.load + self.execution + self.store + self.validation
    }

    fn add_run(&mut self, run: &AnalysisRun) {
        self.deploy += run.deploy_time.unwrap_or_default();
        self.load += run.load_time.unwrap_or_default();
        self.execution += run.execution_time.unwrap_or_default();
        self.store += run.store_time.unwrap_or_default();
        self.validation += run.validation_time.unwrap_or_default();
    }
}

/// Share of total time per phase, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhasePercentages {
    pub deploy: f64,
    pub load: f64,
    pub execution: f64,
    pub store: f64,
    pub validation: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub totals: PhaseTimes,
    #[serde(with = "humantime_serde")]
    pub total: Duration,
    pub percentages: PhasePercentages,
}

impl TimingBreakdown {
    fn from_totals(totals: PhaseTimes) -> Self {
        let total = totals.total();
        let percent = |part: Duration| {
            if total.is_zero() {
                0.0
            } else {
                part.as_secs_f64() / total.as_secs_f64() * 100.0
            }
        };
        Self {
            totals,
            total,
            percentages: PhasePercentages {
                deploy: percent(totals.deploy),
                load: percent(totals.load),
                execution: percent(totals.execution),
                store: percent(totals.store),
                validation: percent(totals.validation),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total_usd: f64,
    pub engine_runtime_minutes: f64,
    pub per_algorithm_usd: BTreeMap<AlgorithmKind, f64>,
}

/// Processing rate over successful runs' load + execution time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Throughput {
    pub vertices_per_second: f64,
    pub edges_per_second: f64,
}

/// One row of the per-run table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmStats {
    pub analysis_name: String,
    pub algorithm: AlgorithmKind,
    pub job_id: Option<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub vertex_count: u64,
    pub edge_count: u64,
    pub documents_updated: u64,
    pub status: RunStatus,
    pub retries: u32,
    pub cost_usd: f64,
}

/// Totals for all runs of one algorithm
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    pub runs: usize,
    pub succeeded: usize,
    #[serde(with = "humantime_serde")]
    pub total_time: Duration,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    /// Fraction of runs that completed, in [0, 1]
    pub success_rate: f64,
    pub total_retries: u32,
    pub timing: TimingBreakdown,
    pub cost: CostBreakdown,
    pub throughput: Throughput,
    pub algorithms: Vec<AlgorithmStats>,
    pub by_algorithm: BTreeMap<AlgorithmKind, AlgorithmSummary>,
}

impl ExecutionMetrics {
    pub fn aggregate<'a>(runs: impl IntoIterator<Item = &'a AnalysisRun>) -> Self {
        let mut metrics = ExecutionMetrics::default();
        let mut totals = PhaseTimes::default();
        let mut processed_vertices: u64 = 0;
        let mut processed_edges: u64 = 0;
        let mut processing_time = Duration::ZERO;

        for run in runs {
            metrics.total_runs += 1;
            metrics.total_retries += run.retry_count;
            totals.add_run(run);

            let duration = run.total_time();
            let succeeded = run.is_success();
            if succeeded {
                metrics.successful_runs += 1;
                processed_vertices += run.vertex_count;
                processed_edges += run.edge_count;
                processing_time += run.load_time.unwrap_or_default() + run.execution_time.unwrap_or_default();
            } else if run.status == RunStatus::Failed {
                metrics.failed_runs += 1;
            }

            metrics.cost.total_usd += run.estimated_cost_usd;
            metrics.cost.engine_runtime_minutes += run.engine_runtime_minutes;
            *metrics.cost.per_algorithm_usd.entry(run.algorithm).or_default() += run.estimated_cost_usd;

            let summary = metrics.by_algorithm.entry(run.algorithm).or_default();
            summary.runs += 1;
            summary.succeeded += usize::from(succeeded);
            summary.total_time += duration;
            summary.total_cost_usd += run.estimated_cost_usd;

            metrics.algorithms.push(AlgorithmStats {
                analysis_name: run.analysis_name.clone(),
                algorithm: run.algorithm,
                job_id: run.job_id.clone(),
                duration,
                vertex_count: run.vertex_count,
                edge_count: run.edge_count,
                documents_updated: run.documents_updated,
                status: run.status,
                retries: run.retry_count,
                cost_usd: run.estimated_cost_usd,
            });
        }

        if metrics.total_runs > 0 {
            metrics.success_rate = metrics.successful_runs as f64 / metrics.total_runs as f64;
        }
        if !processing_time.is_zero() {
            let secs = processing_time.as_secs_f64();
            metrics.throughput = Throughput {
                vertices_per_second: processed_vertices as f64 / secs,
                edges_per_second: processed_edges as f64 / secs,
            };
        }
        metrics.timing = TimingBreakdown::from_totals(totals);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisConfiguration;
    use graph_engine_client::DeploymentMode;

    fn run(name: &str, algorithm: AlgorithmKind, status: RunStatus, secs: [u64; 4], cost: f64) -> AnalysisRun {
        let config = AnalysisConfiguration::builder(name, algorithm)
            .vertex_collection("users")
            .target_collection("users")
            .build()
            .unwrap();
        let mut run = AnalysisRun::new(&config, DeploymentMode::Managed);
        run.status = status;
        run.deploy_time = Some(Duration::from_secs(secs[0]));
        run.load_time = Some(Duration::from_secs(secs[1]));
        run.execution_time = Some(Duration::from_secs(secs[2]));
        run.store_time = Some(Duration::from_secs(secs[3]));
        run.vertex_count = 1000;
        run.edge_count = 4000;
        run.estimated_cost_usd = cost;
        run.job_id = Some(format!("job-{}", name));
        run
    }

    fn sample_runs() -> Vec<AnalysisRun> {
        let mut failed = run("c", AlgorithmKind::Wcc, RunStatus::Failed, [10, 5, 0, 0], 0.2);
        failed.retry_count = 2;
        vec![
            run("a", AlgorithmKind::Pagerank, RunStatus::Completed, [10, 2, 6, 2], 0.5),
            run("b", AlgorithmKind::Wcc, RunStatus::Completed, [10, 3, 4, 3], 0.3),
            failed,
        ]
    }

    #[test]
    fn test_success_rate_and_costs() {
        let metrics = ExecutionMetrics::aggregate(&sample_runs());
        assert_eq!(metrics.total_runs, 3);
        assert_eq!(metrics.successful_runs, 2);
        assert_eq!(metrics.failed_runs, 1);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.total_retries, 2);
        assert!((metrics.cost.total_usd - 1.0).abs() < 1e-9);
        assert!((metrics.cost.per_algorithm_usd[&AlgorithmKind::Wcc] - 0.5).abs() < 1e-9);
        assert_eq!(metrics.by_algorithm[&AlgorithmKind::Wcc].runs, 2);
        assert_eq!(metrics.by_algorithm[&AlgorithmKind::Wcc].succeeded, 1);
    }

    #[test]
    fn test_timing_breakdown() {
        let metrics = ExecutionMetrics::aggregate(&sample_runs());
        assert_eq!(metrics.timing.totals.deploy, Duration::from_secs(30));
        assert_eq!(metrics.timing.total, Duration::from_secs(55));
        let p = metrics.timing.percentages;
        let sum = p.deploy + p.load + p.execution + p.store + p.validation;
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((p.deploy - 30.0 / 55.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_over_successful_runs() {
        let metrics = ExecutionMetrics::aggregate(&sample_runs());
        // 2000 vertices over (2+6) + (3+4) = 15 seconds
        assert!((metrics.throughput.vertices_per_second - 2000.0 / 15.0).abs() < 1e-9);
        assert!((metrics.throughput.edges_per_second - 8000.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_run_table() {
        let metrics = ExecutionMetrics::aggregate(&sample_runs());
        let row = &metrics.algorithms[2];
        assert_eq!(row.analysis_name, "c");
        assert_eq!(row.status, RunStatus::Failed);
        assert_eq!(row.retries, 2);
        assert_eq!(row.duration, Duration::from_secs(15));
        assert_eq!(row.job_id.as_deref(), Some("job-c"));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let runs = sample_runs();
        let first = ExecutionMetrics::aggregate(&runs);
        let second = ExecutionMetrics::aggregate(&runs);
        assert_eq!(first, second);
        assert_eq!(runs, sample_runs_with_ids(&runs));
    }

    /// Same runs rebuilt with the original IDs; aggregation must not mutate input
    fn sample_runs_with_ids(original: &[AnalysisRun]) -> Vec<AnalysisRun> {
        sample_runs()
            .into_iter()
            .zip(original)
            .map(|(mut fresh, old)| {
                fresh.run_id = old.run_id;
                fresh
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let metrics = ExecutionMetrics::aggregate(&Vec::<AnalysisRun>::new());
        assert_eq!(metrics.total_runs, 0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.timing.percentages, PhasePercentages::default());
    }
}
