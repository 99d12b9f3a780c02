//! Per-invocation run state
//!
//! An `AnalysisRun` is created when an orchestrator invocation starts, is
//! mutated as each phase completes, and is handed to validation and metrics
//! afterwards. It is never shared between invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use graph_engine_client::{AlgorithmKind, DeploymentMode};

use crate::analysis::AnalysisConfiguration;
use crate::error::{AnalysisError, AnalysisResult};
use crate::validation::ValidationReport;

/// Lifecycle of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    EngineDeploying,
    GraphLoading,
    AlgorithmRunning,
    StoringResults,
    Validating,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::EngineDeploying => "ENGINE_DEPLOYING",
            RunStatus::GraphLoading => "GRAPH_LOADING",
            RunStatus::AlgorithmRunning => "ALGORITHM_RUNNING",
            RunStatus::StoringResults => "STORING_RESULTS",
            RunStatus::Validating => "VALIDATING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Successor on the happy path
    pub fn next(&self) -> Option<RunStatus> {
        match self {
            RunStatus::Pending => Some(RunStatus::EngineDeploying),
            RunStatus::EngineDeploying => Some(RunStatus::GraphLoading),
            RunStatus::GraphLoading => Some(RunStatus::AlgorithmRunning),
            RunStatus::AlgorithmRunning => Some(RunStatus::StoringResults),
            RunStatus::StoringResults => Some(RunStatus::Validating),
            RunStatus::Validating => Some(RunStatus::Completed),
            RunStatus::Completed | RunStatus::Failed => None,
        }
    }

    /// `Failed` is reachable from every non-terminal state; otherwise only
    /// the next state on the happy path is.
    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == RunStatus::Failed || self.next() == Some(to)
    }

    /// Whether a caller may still abort the run in this state
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            RunStatus::Pending | RunStatus::EngineDeploying | RunStatus::GraphLoading | RunStatus::AlgorithmRunning
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one orchestrator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub analysis_name: String,
    pub algorithm: AlgorithmKind,
    pub deployment_mode: DeploymentMode,
    pub status: RunStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, with = "humantime_serde")]
    pub deploy_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub load_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub execution_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub store_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub validation_time: Option<Duration>,

    pub engine_id: Option<String>,
    pub graph_id: Option<String>,
    pub job_id: Option<String>,

    pub vertex_count: u64,
    pub edge_count: u64,
    pub documents_updated: u64,

    /// Zero for self-managed deployments
    pub estimated_cost_usd: f64,
    pub engine_runtime_minutes: f64,

    pub error_message: Option<String>,
    pub retry_count: u32,
    pub results_stored: bool,
    pub validation: Option<ValidationReport>,
}

impl AnalysisRun {
    pub fn new(config: &AnalysisConfiguration, deployment_mode: DeploymentMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            analysis_name: config.name().to_string(),
            algorithm: config.algorithm(),
            deployment_mode,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            deploy_time: None,
            load_time: None,
            execution_time: None,
            store_time: None,
            validation_time: None,
            engine_id: None,
            graph_id: None,
            job_id: None,
            vertex_count: 0,
            edge_count: 0,
            documents_updated: 0,
            estimated_cost_usd: 0.0,
            engine_runtime_minutes: 0.0,
            error_message: None,
            retry_count: 0,
            results_stored: false,
            validation: None,
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, to: RunStatus) -> AnalysisResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(AnalysisError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Terminate in `Failed`, recording the reason
    pub(crate) fn mark_failed(&mut self, message: String, at: DateTime<Utc>) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Failed;
        }
        self.error_message = Some(message);
        self.completed_at = Some(at);
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Reporting treats anything but `Completed` as having no usable results
    pub fn has_usable_results(&self) -> bool {
        self.is_success() && self.error_message.is_none()
    }

    /// Sum of all recorded phase durations
    pub fn total_time(&self) -> Duration {
        [self.deploy_time, self.load_time, self.execution_time, self.store_time, self.validation_time]
            .into_iter()
            .flatten()
            .sum()
    }
}
