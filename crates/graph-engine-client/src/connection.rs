//! EngineConnection trait: the unified interface for managed and self-managed engines

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AlgorithmKind, DeploymentMode, EngineHandle, EngineSize, GraphInfo, JobHandle, JobStatus,
    LoadGraphRequest, StoreOutcome, StoreResultsRequest,
};

/// Capability set of a remote graph analytics engine.
///
/// Implemented by:
/// - `ManagedConnection`: engine is provisioned on demand and billed
/// - `SelfManagedConnection`: engine already exists, no deployment, no cost
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Which deployment variant this connection talks to
    fn deployment_mode(&self) -> DeploymentMode;

    /// Provision an engine (managed) or locate the existing one (self-managed).
    ///
    /// The returned handle may not be ready yet; use `engine_status` to wait.
    async fn deploy_engine(&self, size: EngineSize) -> EngineResult<EngineHandle>;

    /// Refresh an engine handle, including its ready flag
    async fn engine_status(&self, engine: &EngineHandle) -> EngineResult<EngineHandle>;

    /// Release an engine. A no-op for self-managed deployments.
    async fn delete_engine(&self, engine: &EngineHandle) -> EngineResult<()>;

    /// Load collections into engine memory.
    ///
    /// With `NamedGraph::None` exactly the listed collections are loaded.
    async fn load_graph(&self, engine: &EngineHandle, request: &LoadGraphRequest) -> EngineResult<GraphInfo>;

    /// Submit an algorithm job against a loaded graph
    async fn run_algorithm(
        &self,
        engine: &EngineHandle,
        kind: AlgorithmKind,
        graph_id: &str,
        params: &Map<String, Value>,
    ) -> EngineResult<JobHandle>;

    /// Fetch the progress counters of a job
    async fn poll_job(&self, engine: &EngineHandle, job: &JobHandle) -> EngineResult<JobStatus>;

    /// Whether `cancel_job` asks the engine to kill the job
    fn supports_job_cancel(&self) -> bool {
        false
    }

    /// Ask the engine to abort a running job
    async fn cancel_job(&self, _engine: &EngineHandle, _job: &JobHandle) -> EngineResult<()> {
        Err(EngineError::Unsupported("job cancellation".to_string()))
    }

    /// Write job results into a pre-existing collection
    async fn store_results(&self, engine: &EngineHandle, request: &StoreResultsRequest) -> EngineResult<StoreOutcome>;

    /// Metadata of one loaded graph
    async fn get_graph(&self, engine: &EngineHandle, graph_id: &str) -> EngineResult<GraphInfo>;

    /// All graphs currently loaded in the engine
    async fn list_graphs(&self, engine: &EngineHandle) -> EngineResult<Vec<GraphInfo>>;

    /// Drop a loaded graph from engine memory
    async fn delete_graph(&self, engine: &EngineHandle, graph_id: &str) -> EngineResult<()>;
}
