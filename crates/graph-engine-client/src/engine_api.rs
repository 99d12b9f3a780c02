//! Engine-side endpoints shared by both deployment variants
//!
//! Once an engine handle exists, managed and self-managed engines expose the
//! same `v1/...` API relative to the handle's endpoint.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::http::HttpTransport;
use crate::models::{
    AlgorithmKind, EngineHandle, GraphInfo, JobHandle, JobStatus, LoadGraphRequest, StoreOutcome,
    StoreResultsRequest,
};

#[derive(Deserialize)]
struct JobResponse {
    job_id: Value,
}

#[derive(Deserialize)]
struct GraphListResponse {
    graphs: Vec<GraphInfo>,
}

/// Engines report job ids as numbers or strings
fn id_to_string(value: Value) -> EngineResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(EngineError::Api {
            status: 200,
            message: format!("unexpected job id: {}", other),
        }),
    }
}

pub(crate) struct EngineApi<'a> {
    transport: &'a HttpTransport,
    base: &'a str,
}

impl<'a> EngineApi<'a> {
    pub(crate) fn new(transport: &'a HttpTransport, engine: &'a EngineHandle) -> Self {
        Self { transport, base: &engine.endpoint }
    }

    fn url(&self, path: &str) -> String {
        HttpTransport::url(self.base, path)
    }

    pub(crate) async fn load_graph(&self, request: &LoadGraphRequest) -> EngineResult<GraphInfo> {
        self.transport
            .post(&self.url("v1/loaddata"), request)
            .await
            .map_err(|e| match e {
                EngineError::NotFound(msg) => EngineError::CollectionNotFound(msg),
                other => other,
            })
    }

    pub(crate) async fn run_algorithm(
        &self,
        kind: AlgorithmKind,
        graph_id: &str,
        params: &Map<String, Value>,
    ) -> EngineResult<JobHandle> {
        let mut body = params.clone();
        body.insert("graph_id".to_string(), Value::String(graph_id.to_string()));

        let path = format!("v1/{}", kind.endpoint());
        let response: JobResponse = self.transport.post(&self.url(&path), &body).await?;
        Ok(JobHandle { job_id: id_to_string(response.job_id)? })
    }

    pub(crate) async fn poll_job(&self, job: &JobHandle) -> EngineResult<JobStatus> {
        self.transport.get(&self.url(&format!("v1/jobs/{}", job.job_id))).await
    }

    pub(crate) async fn cancel_job(&self, job: &JobHandle) -> EngineResult<()> {
        self.transport.delete(&self.url(&format!("v1/jobs/{}", job.job_id))).await
    }

    pub(crate) async fn store_results(&self, request: &StoreResultsRequest) -> EngineResult<StoreOutcome> {
        self.transport.post(&self.url("v1/storeresults"), request).await
    }

    pub(crate) async fn get_graph(&self, graph_id: &str) -> EngineResult<GraphInfo> {
        self.transport.get(&self.url(&format!("v1/graphs/{}", graph_id))).await
    }

    pub(crate) async fn list_graphs(&self) -> EngineResult<Vec<GraphInfo>> {
        let response: GraphListResponse = self.transport.get(&self.url("v1/graphs")).await?;
        Ok(response.graphs)
    }

    pub(crate) async fn delete_graph(&self, graph_id: &str) -> EngineResult<()> {
        self.transport.delete(&self.url(&format!("v1/graphs/{}", graph_id))).await
    }
}
