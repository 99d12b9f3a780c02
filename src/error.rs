//! Error types for analysis execution

use std::time::Duration;
use thiserror::Error;

use graph_engine_client::EngineError;

use crate::analysis::ConfigError;
use crate::orchestrator::run::{AnalysisRun, RunStatus};
use crate::validation::ValidationReport;

/// Why an analysis run failed
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Network failures that outlasted the retry budget
    #[error("Transient connection error during {phase} after {attempts} attempt(s): {source}")]
    TransientConnection {
        phase: RunStatus,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    /// The engine reported that the algorithm job failed
    #[error("Remote job error: {0}")]
    RemoteJob(String),

    /// Invalid analysis configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Results were written but are structurally wrong
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// A phase exceeded its time budget
    #[error("{phase} timed out after {waited:?}")]
    Timeout { phase: RunStatus, waited: Duration },

    /// The engine wrote nothing although vertices were loaded
    #[error("No documents written to '{collection}' for {vertex_count} loaded vertices")]
    NoResultsWritten { collection: String, vertex_count: u64 },

    /// Non-retryable remote failure, e.g. a missing collection
    #[error("Engine error during {phase}: {source}")]
    Engine {
        phase: RunStatus,
        #[source]
        source: EngineError,
    },

    /// The caller cancelled the run
    #[error("Cancelled during {phase}")]
    Cancelled { phase: RunStatus },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
}

impl AnalysisError {
    /// Classify a non-transient engine failure raised in `phase`
    pub(crate) fn from_engine(phase: RunStatus, error: EngineError) -> Self {
        match error {
            EngineError::RemoteJob(message) => AnalysisError::RemoteJob(message),
            source => AnalysisError::Engine { phase, source },
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// A failed invocation: the run in its `Failed` state plus the typed cause.
#[derive(Error, Debug)]
#[error("Analysis '{}' failed: {error}", .run.analysis_name)]
pub struct RunFailure {
    pub run: Box<AnalysisRun>,
    #[source]
    pub error: AnalysisError,
}
