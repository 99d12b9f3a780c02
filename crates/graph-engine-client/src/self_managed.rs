//! SelfManagedConnection: a long-lived engine that already exists
//!
//! There is no deployment step and no cost; "deploying" locates the engine.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::connection::EngineConnection;
use crate::engine_api::EngineApi;
use crate::error::{EngineError, EngineResult};
use crate::http::HttpTransport;
use crate::models::{
    AlgorithmKind, DeploymentMode, EngineHandle, EngineSize, GraphInfo, JobHandle, JobStatus,
    LoadGraphRequest, StoreOutcome, StoreResultsRequest,
};

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    engine_id: Option<String>,
    #[serde(default)]
    status: String,
}

/// Client for a pre-existing engine at a fixed endpoint.
pub struct SelfManagedConnection {
    endpoint: String,
    transport: HttpTransport,
}

impl SelfManagedConnection {
    pub fn new(endpoint: &str, token: Option<String>) -> EngineResult<Self> {
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            transport: HttpTransport::new(token)?,
        })
    }

    /// Look up the engine behind the configured endpoint
    pub async fn locate_engine(&self) -> EngineResult<EngineHandle> {
        let url = HttpTransport::url(&self.endpoint, "v1/status");
        let status: StatusResponse = self.transport.get(&url).await?;
        debug!("Engine at {} reports status '{}'", self.endpoint, status.status);

        if status.status.eq_ignore_ascii_case("unhealthy") {
            return Err(EngineError::Transient(format!("Engine unhealthy: {}", self.endpoint)));
        }

        Ok(EngineHandle {
            id: status.engine_id.unwrap_or_else(|| self.endpoint.clone()),
            endpoint: self.endpoint.clone(),
            ready: true,
            size: None,
            deployed_at: None,
        })
    }
}

#[async_trait]
impl EngineConnection for SelfManagedConnection {
    fn deployment_mode(&self) -> DeploymentMode {
        DeploymentMode::SelfManaged
    }

    async fn deploy_engine(&self, _size: EngineSize) -> EngineResult<EngineHandle> {
        self.locate_engine().await
    }

    async fn engine_status(&self, _engine: &EngineHandle) -> EngineResult<EngineHandle> {
        self.locate_engine().await
    }

    async fn delete_engine(&self, _engine: &EngineHandle) -> EngineResult<()> {
        // The engine outlives every analysis.
        Ok(())
    }

    async fn load_graph(&self, engine: &EngineHandle, request: &LoadGraphRequest) -> EngineResult<GraphInfo> {
        EngineApi::new(&self.transport, engine).load_graph(request).await
    }

    async fn run_algorithm(
        &self,
        engine: &EngineHandle,
        kind: AlgorithmKind,
        graph_id: &str,
        params: &Map<String, Value>,
    ) -> EngineResult<JobHandle> {
        EngineApi::new(&self.transport, engine).run_algorithm(kind, graph_id, params).await
    }

    async fn poll_job(&self, engine: &EngineHandle, job: &JobHandle) -> EngineResult<JobStatus> {
        EngineApi::new(&self.transport, engine).poll_job(job).await
    }

    async fn store_results(&self, engine: &EngineHandle, request: &StoreResultsRequest) -> EngineResult<StoreOutcome> {
        EngineApi::new(&self.transport, engine).store_results(request).await
    }

    async fn get_graph(&self, engine: &EngineHandle, graph_id: &str) -> EngineResult<GraphInfo> {
        EngineApi::new(&self.transport, engine).get_graph(graph_id).await
    }

    async fn list_graphs(&self, engine: &EngineHandle) -> EngineResult<Vec<GraphInfo>> {
        EngineApi::new(&self.transport, engine).list_graphs().await
    }

    async fn delete_graph(&self, engine: &EngineHandle, graph_id: &str) -> EngineResult<()> {
        EngineApi::new(&self.transport, engine).delete_graph(graph_id).await
    }
}
