//! Graph Analytics Orchestrator
//!
//! Runs graph algorithms (PageRank, connected components, label propagation,
//! betweenness) on a remote analytics engine and writes the results back to
//! the source database.
//!
//! # Architecture
//!
//! - `analysis`: declarative, validated description of one analysis
//! - `orchestrator`: drives a run through deploy, load, execute, store and
//!   validate, with retries, timeouts, cancellation and cost tracking
//! - `validation`: structural checks over the stored results
//! - `metrics`: aggregate timing, cost and throughput over finished runs
//! - `settings`: YAML + environment configuration
//!
//! The remote engine is reached through the `graph-engine-client` crate,
//! which provides the managed and self-managed connection variants.
//!
//! ## Example Usage
//!
//! ```no_run
//! use graph_analytics::{AlgorithmKind, AnalysisConfiguration, Orchestrator, OrchestratorSettings};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = OrchestratorSettings::from_yaml_file("orchestrator.yaml")?.apply_env_overrides()?;
//! let orchestrator = Orchestrator::from_settings(settings)?;
//!
//! let config = AnalysisConfiguration::builder("Fraud Rings", AlgorithmKind::Wcc)
//!     .vertex_collections(["accounts"])
//!     .edge_collections(["transfers"])
//!     .target_collection("accounts")
//!     .build()?;
//!
//! let run = orchestrator.execute(&config).await?;
//! println!("{} documents updated", run.documents_updated);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod settings;
pub mod validation;

// Re-export main types for convenience
pub use analysis::{canonical_result_field, AnalysisConfiguration, AnalysisConfigurationBuilder, ConfigError};

pub use cost::{CostEstimate, CostTable};

pub use error::{AnalysisError, AnalysisResult, RunFailure};

pub use metrics::{AlgorithmStats, CostBreakdown, ExecutionMetrics, Throughput, TimingBreakdown};

pub use orchestrator::{
    cancellation, AnalysisRun, CancelHandle, CancelSignal, Clock, EngineLocks, Orchestrator, RetryPolicy,
    RunStatus, SharedEngine, TokioClock,
};

pub use settings::{OrchestratorSettings, SettingsError, SettingsResult};

pub use validation::{CheckFailure, ValidationCheck, ValidationReport, DEFAULT_SAMPLE_SIZE};

pub use graph_engine_client::{
    AlgorithmKind, DeploymentMode, EngineConnection, EngineError, EngineHandle, EngineSize, ResultReader,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
