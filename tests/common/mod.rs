//! In-memory engine and result store used by the orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use graph_analytics::{AnalysisConfiguration, CancelHandle, Orchestrator, OrchestratorSettings, RetryPolicy};
use graph_engine_client::{
    AlgorithmKind, DeploymentMode, EngineConnection, EngineError, EngineHandle, EngineResult, EngineSize,
    GraphInfo, JobHandle, JobStatus, LoadGraphRequest, ResultDocument, ResultReader, StoreOutcome,
    StoreResultsRequest,
};

/// Everything the stub saw, for assertions
#[derive(Debug, Default)]
pub struct Recorded {
    pub deploys: u32,
    pub status_calls: u32,
    pub load_calls: u32,
    pub read_calls: u32,
    pub loads: Vec<LoadGraphRequest>,
    pub submitted: Vec<(AlgorithmKind, Map<String, Value>)>,
    pub polls: HashMap<String, u32>,
    pub cancelled_jobs: Vec<String>,
    pub stores: Vec<StoreResultsRequest>,
    pub deleted_engines: Vec<String>,
    pub deleted_graphs: Vec<String>,
    pub active_jobs: u32,
    pub max_active_jobs: u32,
    finished_jobs: HashSet<String>,
    graphs: Vec<GraphInfo>,
    /// Stored documents per target collection
    stored: HashMap<String, Vec<ResultDocument>>,
}

/// Scriptable engine implementing both the engine connection and the
/// result reader
pub struct StubEngine {
    pub mode: DeploymentMode,
    pub vertex_count: u64,
    pub edge_count: u64,
    /// Distinct result values written per field
    pub components: u64,
    /// Extra stored documents from outside the loaded collections
    pub foreign_vertices: Vec<String>,
    /// Collections that fail to load as missing
    pub missing_collections: Vec<String>,
    pub transient_load_failures: u32,
    pub transient_poll_failures: u32,
    /// Polls until a job reports `progress == total`
    pub polls_to_complete: u32,
    pub never_complete: bool,
    pub job_error: Option<String>,
    pub docs_written: Option<u64>,
    /// `engine_status` calls before a deployed engine is ready
    pub ready_after: u32,
    /// Leading `engine_status` calls that fail transiently
    pub transient_status_failures: u32,
    /// Leading result reads that fail transiently
    pub transient_read_failures: u32,
    /// Fired while results are being stored
    pub cancel_on_store: Option<CancelHandle>,
    pub recorded: Mutex<Recorded>,
}

impl StubEngine {
    pub fn new(mode: DeploymentMode) -> Self {
        Self {
            mode,
            vertex_count: 10,
            edge_count: 25,
            components: 3,
            foreign_vertices: Vec::new(),
            missing_collections: Vec::new(),
            transient_load_failures: 0,
            transient_poll_failures: 0,
            polls_to_complete: 2,
            never_complete: false,
            job_error: None,
            docs_written: None,
            ready_after: 0,
            transient_status_failures: 0,
            transient_read_failures: 0,
            cancel_on_store: None,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn self_managed() -> Self {
        Self::new(DeploymentMode::SelfManaged)
    }

    pub fn managed() -> Self {
        Self::new(DeploymentMode::Managed)
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }

    pub fn stored(&self, collection: &str) -> Vec<ResultDocument> {
        self.recorded().stored.get(collection).cloned().unwrap_or_default()
    }

    fn engine_handle(&self, ready: bool) -> EngineHandle {
        EngineHandle {
            id: "engine-1".to_string(),
            endpoint: "http://stub-engine".to_string(),
            ready,
            size: (self.mode == DeploymentMode::Managed).then_some(EngineSize::Small),
            deployed_at: None,
        }
    }

    fn finish_job(recorded: &mut Recorded, job_id: &str) {
        if recorded.finished_jobs.insert(job_id.to_string()) {
            recorded.active_jobs = recorded.active_jobs.saturating_sub(1);
        }
    }
}

#[async_trait]
impl EngineConnection for StubEngine {
    fn deployment_mode(&self) -> DeploymentMode {
        self.mode
    }

    async fn deploy_engine(&self, _size: EngineSize) -> EngineResult<EngineHandle> {
        let mut recorded = self.recorded();
        recorded.deploys += 1;
        Ok(self.engine_handle(self.ready_after == 0))
    }

    async fn engine_status(&self, _engine: &EngineHandle) -> EngineResult<EngineHandle> {
        let mut recorded = self.recorded();
        recorded.status_calls += 1;
        if recorded.status_calls <= self.transient_status_failures {
            return Err(EngineError::Transient("control plane unavailable".to_string()));
        }
        Ok(self.engine_handle(recorded.status_calls >= self.ready_after))
    }

    async fn delete_engine(&self, engine: &EngineHandle) -> EngineResult<()> {
        self.recorded().deleted_engines.push(engine.id.clone());
        Ok(())
    }

    async fn load_graph(&self, _engine: &EngineHandle, request: &LoadGraphRequest) -> EngineResult<GraphInfo> {
        let mut recorded = self.recorded();
        recorded.load_calls += 1;
        if recorded.load_calls <= self.transient_load_failures {
            return Err(EngineError::Transient("connection reset by peer".to_string()));
        }
        if let Some(missing) = request
            .vertex_collections
            .iter()
            .chain(&request.edge_collections)
            .find(|c| self.missing_collections.contains(c))
        {
            return Err(EngineError::CollectionNotFound(missing.clone()));
        }

        recorded.loads.push(request.clone());
        let graph = GraphInfo {
            graph_id: format!("graph-{}", recorded.loads.len()),
            vertex_count: self.vertex_count,
            edge_count: self.edge_count,
        };
        recorded.graphs.push(graph.clone());
        Ok(graph)
    }

    async fn run_algorithm(
        &self,
        _engine: &EngineHandle,
        kind: AlgorithmKind,
        _graph_id: &str,
        params: &Map<String, Value>,
    ) -> EngineResult<JobHandle> {
        let mut recorded = self.recorded();
        recorded.submitted.push((kind, params.clone()));
        recorded.active_jobs += 1;
        recorded.max_active_jobs = recorded.max_active_jobs.max(recorded.active_jobs);
        Ok(JobHandle { job_id: format!("job-{}", recorded.submitted.len()) })
    }

    async fn poll_job(&self, _engine: &EngineHandle, job: &JobHandle) -> EngineResult<JobStatus> {
        let mut recorded = self.recorded();
        let total_polls: u32 = recorded.polls.values().sum();
        if total_polls < self.transient_poll_failures {
            *recorded.polls.entry(job.job_id.clone()).or_default() += 1;
            return Err(EngineError::Api { status: 503, message: "engine busy".to_string() });
        }

        let polls = {
            let count = recorded.polls.entry(job.job_id.clone()).or_default();
            *count += 1;
            *count
        };

        if let Some(message) = &self.job_error {
            Self::finish_job(&mut recorded, &job.job_id);
            return Ok(JobStatus {
                progress: 1,
                total: 10,
                status: "failed".to_string(),
                error: Some(message.clone()),
            });
        }

        let total = u64::from(self.polls_to_complete.max(1));
        let progress = if self.never_complete { 0 } else { u64::from(polls).min(total) };
        if progress >= total {
            Self::finish_job(&mut recorded, &job.job_id);
        }
        // The status text claims completion from the first poll on
        Ok(JobStatus { progress, total, status: "done".to_string(), error: None })
    }

    fn supports_job_cancel(&self) -> bool {
        self.mode == DeploymentMode::Managed
    }

    async fn cancel_job(&self, _engine: &EngineHandle, job: &JobHandle) -> EngineResult<()> {
        let mut recorded = self.recorded();
        recorded.cancelled_jobs.push(job.job_id.clone());
        Self::finish_job(&mut recorded, &job.job_id);
        Ok(())
    }

    async fn store_results(&self, _engine: &EngineHandle, request: &StoreResultsRequest) -> EngineResult<StoreOutcome> {
        if let Some(handle) = &self.cancel_on_store {
            handle.cancel();
        }
        let mut recorded = self.recorded();
        recorded.stores.push(request.clone());

        let written = self.docs_written.unwrap_or(self.vertex_count);
        let vertex_collections: Vec<String> = recorded
            .loads
            .last()
            .map(|load| load.vertex_collections.clone())
            .unwrap_or_default();

        let mut ids: Vec<String> = (0..written)
            .filter_map(|i| {
                let collection = vertex_collections.get(i as usize % vertex_collections.len().max(1))?;
                Some(format!("{}/{}", collection, i))
            })
            .collect();
        ids.extend(self.foreign_vertices.iter().cloned());

        let docs = recorded.stored.entry(request.target_collection.clone()).or_default();
        for (i, id) in ids.into_iter().enumerate() {
            let value = Value::from(format!("c{}", i as u64 % self.components.max(1)));
            let position = match docs.iter().position(|doc| doc.id == id) {
                Some(position) => position,
                None => {
                    docs.push(ResultDocument::new(id));
                    docs.len() - 1
                }
            };
            for attribute in &request.attribute_names {
                docs[position].fields.insert(attribute.clone(), value.clone());
            }
        }

        Ok(StoreOutcome { documents_written: written })
    }

    async fn get_graph(&self, _engine: &EngineHandle, graph_id: &str) -> EngineResult<GraphInfo> {
        self.recorded()
            .graphs
            .iter()
            .find(|g| g.graph_id == graph_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(graph_id.to_string()))
    }

    async fn list_graphs(&self, _engine: &EngineHandle) -> EngineResult<Vec<GraphInfo>> {
        Ok(self.recorded().graphs.clone())
    }

    async fn delete_graph(&self, _engine: &EngineHandle, graph_id: &str) -> EngineResult<()> {
        let mut recorded = self.recorded();
        recorded.graphs.retain(|g| g.graph_id != graph_id);
        recorded.deleted_graphs.push(graph_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl ResultReader for StubEngine {
    async fn sample_results(&self, _database: &str, collection: &str, limit: usize) -> EngineResult<Vec<ResultDocument>> {
        {
            let mut recorded = self.recorded();
            recorded.read_calls += 1;
            if recorded.read_calls <= self.transient_read_failures {
                return Err(EngineError::Transient("cursor request timed out".to_string()));
            }
        }
        Ok(self.stored(collection).into_iter().take(limit).collect())
    }

    async fn count_distinct(&self, _database: &str, collection: &str, field: &str) -> EngineResult<u64> {
        let distinct: HashSet<String> = self
            .stored(collection)
            .iter()
            .filter_map(|doc| doc.get(field))
            .map(|value| value.to_string())
            .collect();
        Ok(distinct.len() as u64)
    }
}

/// Settings with short intervals and deterministic backoff
pub fn test_settings(mode: DeploymentMode) -> OrchestratorSettings {
    OrchestratorSettings {
        deployment_mode: mode,
        database: "shop".to_string(),
        poll_interval: Duration::from_secs(1),
        max_wait: Duration::from_secs(60),
        deploy_timeout: Duration::from_secs(60),
        deploy_poll_interval: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
            jitter: false,
        },
        ..OrchestratorSettings::default()
    }
}

pub fn orchestrator(stub: &Arc<StubEngine>, settings: OrchestratorSettings) -> Orchestrator {
    Orchestrator::new(stub.clone(), stub.clone(), settings)
}

pub fn wcc_config(name: &str) -> AnalysisConfiguration {
    AnalysisConfiguration::builder(name, AlgorithmKind::Wcc)
        .vertex_collections(["A", "B"])
        .edge_collections(["E"])
        .target_collection("results")
        .build()
        .unwrap()
}
