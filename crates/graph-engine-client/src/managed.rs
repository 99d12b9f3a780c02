//! ManagedConnection: engines provisioned on demand through a control plane
//!
//! Every analysis gets its own engine, billed from deployment start until
//! teardown.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::connection::EngineConnection;
use crate::engine_api::EngineApi;
use crate::error::EngineResult;
use crate::http::HttpTransport;
use crate::models::{
    AlgorithmKind, DeploymentMode, EngineHandle, EngineSize, GraphInfo, JobHandle, JobStatus,
    LoadGraphRequest, StoreOutcome, StoreResultsRequest,
};

#[derive(Serialize)]
struct DeployRequest<'a> {
    size_id: &'a str,
}

/// Control-plane view of an engine
#[derive(Deserialize)]
struct EngineResponse {
    id: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    size_id: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
}

fn size_from_id(size_id: &str) -> Option<EngineSize> {
    [EngineSize::XSmall, EngineSize::Small, EngineSize::Medium, EngineSize::Large, EngineSize::XLarge]
        .into_iter()
        .find(|size| size.size_id() == size_id)
}

/// Client for engines provisioned per analysis.
pub struct ManagedConnection {
    control_plane_url: String,
    transport: HttpTransport,
}

impl ManagedConnection {
    /// Create a connection against the given control-plane base URL.
    ///
    /// # Example
    /// ```no_run
    /// # use graph_engine_client::ManagedConnection;
    /// let conn = ManagedConnection::new("https://analytics.example.com", Some("token".into())).unwrap();
    /// ```
    pub fn new(control_plane_url: &str, token: Option<String>) -> EngineResult<Self> {
        Ok(Self {
            control_plane_url: control_plane_url.trim_end_matches('/').to_string(),
            transport: HttpTransport::new(token)?,
        })
    }

    fn engines_url(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => HttpTransport::url(&self.control_plane_url, &format!("v1/engines/{}", id)),
            None => HttpTransport::url(&self.control_plane_url, "v1/engines"),
        }
    }

    fn to_handle(response: EngineResponse, fallback_size: Option<EngineSize>, fallback_start: Option<DateTime<Utc>>) -> EngineHandle {
        EngineHandle {
            endpoint: response.endpoint.unwrap_or_default(),
            ready: response.ready,
            size: response.size_id.as_deref().and_then(size_from_id).or(fallback_size),
            deployed_at: response.started_at.or(fallback_start),
            id: response.id,
        }
    }
}

#[async_trait]
impl EngineConnection for ManagedConnection {
    fn deployment_mode(&self) -> DeploymentMode {
        DeploymentMode::Managed
    }

    async fn deploy_engine(&self, size: EngineSize) -> EngineResult<EngineHandle> {
        let requested_at = Utc::now();
        let response: EngineResponse = self.transport
            .post(&self.engines_url(None), &DeployRequest { size_id: size.size_id() })
            .await?;
        info!("Requested {} engine {}", size, response.id);
        Ok(Self::to_handle(response, Some(size), Some(requested_at)))
    }

    async fn engine_status(&self, engine: &EngineHandle) -> EngineResult<EngineHandle> {
        let response: EngineResponse = self.transport.get(&self.engines_url(Some(&engine.id))).await?;
        Ok(Self::to_handle(response, engine.size, engine.deployed_at))
    }

    async fn delete_engine(&self, engine: &EngineHandle) -> EngineResult<()> {
        self.transport.delete(&self.engines_url(Some(&engine.id))).await?;
        info!("Deleted engine {}", engine.id);
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

    fn supports_job_cancel(&self) -> bool {
        true
    }

    async fn cancel_job(&self, engine: &EngineHandle, job: &JobHandle) -> EngineResult<()> {
        EngineApi::new(&self.transport, engine).cancel_job(job).await
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_ids_round_trip() {
        assert_eq!(size_from_id("e16"), Some(EngineSize::Medium));
        assert_eq!(size_from_id("e128"), None);
    }
}
