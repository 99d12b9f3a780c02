//! Execution orchestrator
//!
//! Drives one `AnalysisConfiguration` through the engine lifecycle:
//!
//! ```text
//! PENDING -> ENGINE_DEPLOYING -> GRAPH_LOADING -> ALGORITHM_RUNNING
//!         -> STORING_RESULTS -> VALIDATING -> COMPLETED
//! ```
//!
//! with `FAILED` reachable from every non-terminal state. Each invocation
//! owns its `AnalysisRun`; invocations share nothing except, optionally, a
//! `SharedEngine` whose algorithm phase is serialized per engine.

pub mod cancel;
pub mod clock;
pub mod retry;
pub mod run;
pub mod shared;

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use graph_engine_client::{
    DeploymentMode, EngineConnection, EngineHandle, EngineResult, EngineSize, GraphInfo, JobHandle, JobStatus,
    LoadGraphRequest, ResultReader, StoreResultsRequest,
};

use crate::analysis::AnalysisConfiguration;
use crate::error::{AnalysisError, AnalysisResult, RunFailure};
use crate::settings::{OrchestratorSettings, SettingsResult};
use crate::validation::{validate_results, ResultSet};

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use clock::{Clock, TokioClock};
pub use retry::RetryPolicy;
pub use run::{AnalysisRun, RunStatus};
pub use shared::{EngineLocks, SharedEngine};

/// Engine state an invocation has to clean up after itself
#[derive(Default)]
struct EngineLease {
    engine: Option<EngineHandle>,
    deploy_started: Option<Instant>,
    size: EngineSize,
    /// Engine belongs to a `SharedEngine` and outlives this run
    borrowed: bool,
}

/// Sequences engine calls into phases, with timing, cost, retries and
/// validation.
pub struct Orchestrator {
    connection: Arc<dyn EngineConnection>,
    results: Arc<dyn ResultReader>,
    settings: OrchestratorSettings,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        connection: Arc<dyn EngineConnection>,
        results: Arc<dyn ResultReader>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            connection,
            results,
            settings,
            clock: Arc::new(TokioClock),
        }
    }

    /// Build connections from the settings' deployment mode and endpoints
    pub fn from_settings(settings: OrchestratorSettings) -> SettingsResult<Self> {
        settings.validate()?;
        let connection = settings.engine_connection()?;
        let results = settings.result_reader()?;
        Ok(Self::new(connection, results, settings))
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn connection(&self) -> &Arc<dyn EngineConnection> {
        &self.connection
    }

    /// Run one analysis to completion
    pub async fn execute(&self, config: &AnalysisConfiguration) -> Result<AnalysisRun, RunFailure> {
        self.execute_with_cancel(config, CancelSignal::never()).await
    }

    /// Run one analysis, aborting waits when `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        config: &AnalysisConfiguration,
        cancel: CancelSignal,
    ) -> Result<AnalysisRun, RunFailure> {
        self.invoke(config, None, cancel).await
    }

    /// Run one analysis against an engine and graph that are already loaded.
    ///
    /// The algorithm phase holds the engine's job lock, so concurrent callers
    /// sharing the engine take turns.
    pub async fn execute_on(
        &self,
        config: &AnalysisConfiguration,
        shared: &SharedEngine,
        cancel: CancelSignal,
    ) -> Result<AnalysisRun, RunFailure> {
        self.invoke(config, Some(shared), cancel).await
    }

    /// Run several independent analyses concurrently
    pub async fn execute_all(&self, configs: &[AnalysisConfiguration]) -> Vec<Result<AnalysisRun, RunFailure>> {
        join_all(configs.iter().map(|config| self.execute(config))).await
    }

    /// Deploy an engine and load `config`'s collections for reuse by several
    /// analyses over the same collections
    pub async fn provision_shared(
        &self,
        config: &AnalysisConfiguration,
        locks: &EngineLocks,
    ) -> AnalysisResult<SharedEngine> {
        config.validate()?;
        let mut retries = 0;
        let mut lease = EngineLease::default();
        let cancel = CancelSignal::never();

        let provisioned = async {
            let engine = self.acquire_engine(config, &mut lease, &mut retries, &cancel).await?;
            let graph = self.load_graph(config, &engine, &mut retries, &cancel).await?;
            Ok::<_, AnalysisError>((engine, graph))
        }
        .await;

        match provisioned {
            Ok((engine, graph)) => {
                info!("Provisioned shared engine {} with graph {}", engine.id, graph.graph_id);
                Ok(locks.share(engine, graph, config))
            }
            Err(e) => {
                self.teardown(&lease).await;
                Err(e)
            }
        }
    }

    /// Drop the shared graph and, for managed deployments, the engine
    pub async fn release_shared(&self, shared: SharedEngine, locks: &EngineLocks) -> AnalysisResult<()> {
        let engine = shared.engine();
        self.connection
            .delete_graph(engine, &shared.graph().graph_id)
            .await
            .map_err(|e| AnalysisError::from_engine(RunStatus::Completed, e))?;
        if self.connection.deployment_mode() == DeploymentMode::Managed {
            self.connection
                .delete_engine(engine)
                .await
                .map_err(|e| AnalysisError::from_engine(RunStatus::Completed, e))?;
        }
        locks.remove(&engine.id);
        Ok(())
    }

    async fn invoke(
        &self,
        config: &AnalysisConfiguration,
        shared: Option<&SharedEngine>,
        cancel: CancelSignal,
    ) -> Result<AnalysisRun, RunFailure> {
        let mut run = AnalysisRun::new(config, self.connection.deployment_mode());
        let span = info_span!("analysis", name = %config.name(), run_id = %run.run_id);

        async move {
            run.started_at = Some(self.clock.wall_clock());
            info!("Starting {} analysis on {} deployment", config.algorithm(), run.deployment_mode);

            let checked = config
                .validate()
                .and_then(|()| shared.map_or(Ok(()), |shared| shared.check_collections(config)));
            if let Err(e) = checked {
                return Err(self.fail(run, e.into()));
            }

            let mut lease = EngineLease { borrowed: shared.is_some(), ..EngineLease::default() };
            let outcome = self.drive(config, &mut run, &mut lease, shared, &cancel).await;

            self.settle_cost(&mut run, &lease);
            if self.settings.teardown_engine {
                self.teardown(&lease).await;
            }

            match outcome {
                Ok(()) => {
                    run.completed_at = Some(self.clock.wall_clock());
                    info!(
                        "Analysis completed: {} documents updated in {:?}, est. cost ${:.4}",
                        run.documents_updated,
                        run.total_time(),
                        run.estimated_cost_usd
                    );
                    Ok(run)
                }
                Err(e) => Err(self.fail(run, e)),
            }
        }
        .instrument(span)
        .await
    }

    fn fail(&self, mut run: AnalysisRun, error: AnalysisError) -> RunFailure {
        error!("Analysis failed in {}: {}", run.status, error);
        run.mark_failed(error.to_string(), self.clock.wall_clock());
        RunFailure { run: Box::new(run), error }
    }

    async fn drive(
        &self,
        config: &AnalysisConfiguration,
        run: &mut AnalysisRun,
        lease: &mut EngineLease,
        shared: Option<&SharedEngine>,
        cancel: &CancelSignal,
    ) -> AnalysisResult<()> {
        // ENGINE_DEPLOYING
        run.transition(RunStatus::EngineDeploying)?;
        let phase_start = self.clock.now();
        let engine = match shared {
            Some(shared) => shared.engine().clone(),
            None => self.acquire_engine(config, lease, &mut run.retry_count, cancel).await?,
        };
        run.engine_id = Some(engine.id.clone());
        run.deploy_time = Some(match (self.connection.deployment_mode(), shared) {
            (DeploymentMode::Managed, None) => self.clock.now() - phase_start,
            _ => Duration::ZERO,
        });
        self.check_cancelled(run, cancel)?;

        // GRAPH_LOADING
        run.transition(RunStatus::GraphLoading)?;
        let phase_start = self.clock.now();
        let graph = match shared {
            Some(shared) => shared.graph().clone(),
            None => self.load_graph(config, &engine, &mut run.retry_count, cancel).await?,
        };
        run.graph_id = Some(graph.graph_id.clone());
        run.vertex_count = graph.vertex_count;
        run.edge_count = graph.edge_count;
        run.load_time = Some(self.clock.now() - phase_start);
        self.check_cancelled(run, cancel)?;

        // ALGORITHM_RUNNING
        run.transition(RunStatus::AlgorithmRunning)?;
        let job = {
            let _job_lock = match shared {
                Some(shared) => Some(shared.acquire().await),
                None => None,
            };
            let phase_start = self.clock.now();
            let job = self.submit_job(config, &engine, &graph).await?;
            run.job_id = Some(job.job_id.clone());
            self.await_job(&engine, &job, run, cancel).await?;
            run.execution_time = Some(self.clock.now() - phase_start);
            job
        };

        // STORING_RESULTS: cancellation is no longer honored from here on
        run.transition(RunStatus::StoringResults)?;
        let phase_start = self.clock.now();
        self.store_results(config, &engine, &job, run).await?;
        run.store_time = Some(self.clock.now() - phase_start);

        // VALIDATING
        run.transition(RunStatus::Validating)?;
        let phase_start = self.clock.now();
        let outcome = self.validate(config, run).await;
        run.validation_time = Some(self.clock.now() - phase_start);
        outcome?;

        run.transition(RunStatus::Completed)
    }

    fn check_cancelled(&self, run: &AnalysisRun, cancel: &CancelSignal) -> AnalysisResult<()> {
        if cancel.is_cancelled() && run.status.is_cancellable() {
            warn!("Cancellation requested during {}", run.status);
            return Err(AnalysisError::Cancelled { phase: run.status });
        }
        Ok(())
    }

    /// Sleep, returning early with `Cancelled` if the signal fires
    async fn pause(&self, delay: Duration, phase: RunStatus, cancel: Option<&CancelSignal>) -> AnalysisResult<()> {
        match cancel {
            Some(signal) => {
                tokio::select! {
                    _ = self.clock.sleep(delay) => Ok(()),
                    _ = signal.cancelled() => Err(AnalysisError::Cancelled { phase }),
                }
            }
            None => {
                self.clock.sleep(delay).await;
                Ok(())
            }
        }
    }

    /// Retry `op` on transient failures with exponential backoff.
    ///
    /// Non-transient failures surface immediately; transient ones surface as
    /// `TransientConnection` once the retry budget is spent.
    async fn with_retry<T, F, Fut>(
        &self,
        phase: RunStatus,
        retries: &mut u32,
        cancel: Option<&CancelSignal>,
        mut op: F,
    ) -> AnalysisResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let policy = &self.settings.retry;
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    attempt += 1;
                    *retries += 1;
                    let delay = policy.backoff(attempt);
                    warn!("Transient error during {} (retry {}/{} in {:?}): {}", phase, attempt, policy.max_retries, delay, e);
                    self.pause(delay, phase, cancel).await?;
                }
                Err(e) if e.is_transient() => {
                    return Err(AnalysisError::TransientConnection { phase, attempts: attempt + 1, source: e });
                }
                Err(e) => return Err(AnalysisError::from_engine(phase, e)),
            }
        }
    }

    /// Deploy (managed) or locate (self-managed) an engine and wait until it
    /// is ready
    async fn acquire_engine(
        &self,
        config: &AnalysisConfiguration,
        lease: &mut EngineLease,
        retries: &mut u32,
        cancel: &CancelSignal,
    ) -> AnalysisResult<EngineHandle> {
        let phase = RunStatus::EngineDeploying;
        let size = config.engine_size();
        lease.size = size;

        let started = self.clock.now();
        if self.connection.deployment_mode() == DeploymentMode::Managed {
            lease.deploy_started = Some(started);
        }

        let mut engine = self
            .within_deploy_timeout(
                started,
                self.with_retry(phase, retries, Some(cancel), || self.connection.deploy_engine(size)),
            )
            .await?;
        lease.engine = Some(engine.clone());
        info!("Engine {} acquired (ready: {})", engine.id, engine.ready);

        while !engine.ready {
            let current = engine.clone();
            engine = self
                .within_deploy_timeout(started, async {
                    self.pause(self.settings.deploy_poll_interval, phase, Some(cancel)).await?;
                    self.with_retry(phase, retries, Some(cancel), || self.connection.engine_status(&current))
                        .await
                })
                .await?;
            lease.engine = Some(engine.clone());
            debug!("Engine {} ready: {}", engine.id, engine.ready);
        }

        Ok(engine)
    }

    /// Run `step` against what is left of `deploy_timeout` since `started`
    async fn within_deploy_timeout<T>(
        &self,
        started: Instant,
        step: impl Future<Output = AnalysisResult<T>>,
    ) -> AnalysisResult<T> {
        let remaining = self.settings.deploy_timeout.saturating_sub(self.clock.now() - started);
        tokio::select! {
            biased;
            result = step => result,
            _ = self.clock.sleep(remaining) => Err(AnalysisError::Timeout {
                phase: RunStatus::EngineDeploying,
                waited: self.clock.now() - started,
            }),
        }
    }

    async fn load_graph(
        &self,
        config: &AnalysisConfiguration,
        engine: &EngineHandle,
        retries: &mut u32,
        cancel: &CancelSignal,
    ) -> AnalysisResult<GraphInfo> {
        let request = LoadGraphRequest::collections(
            self.settings.database.as_str(),
            config.vertex_collections().iter().cloned(),
            config.edge_collections().iter().cloned(),
        );

        let graph = self
            .with_retry(RunStatus::GraphLoading, retries, Some(cancel), || {
                self.connection.load_graph(engine, &request)
            })
            .await?;
        info!(
            "Loaded graph {} ({} vertices, {} edges)",
            graph.graph_id, graph.vertex_count, graph.edge_count
        );
        Ok(graph)
    }

    /// Job submission is not retried; a resubmission could run the job twice
    async fn submit_job(
        &self,
        config: &AnalysisConfiguration,
        engine: &EngineHandle,
        graph: &GraphInfo,
    ) -> AnalysisResult<JobHandle> {
        let phase = RunStatus::AlgorithmRunning;
        let job = self
            .connection
            .run_algorithm(engine, config.algorithm(), &graph.graph_id, config.algorithm_params())
            .await
            .map_err(|e| {
                if e.is_transient() {
                    AnalysisError::TransientConnection { phase, attempts: 1, source: e }
                } else {
                    AnalysisError::from_engine(phase, e)
                }
            })?;
        info!("Submitted {} job {}", config.algorithm(), job.job_id);
        Ok(job)
    }

    /// Poll until `progress` reaches `total`, the job reports an error, or
    /// `max_wait` elapses
    async fn await_job(
        &self,
        engine: &EngineHandle,
        job: &JobHandle,
        run: &mut AnalysisRun,
        cancel: &CancelSignal,
    ) -> AnalysisResult<JobStatus> {
        let phase = RunStatus::AlgorithmRunning;
        let policy = &self.settings.retry;
        let started = self.clock.now();
        let mut transient_failures: u32 = 0;

        loop {
            let delay = match self.connection.poll_job(engine, job).await {
                Ok(status) => {
                    if let Some(message) = &status.error {
                        return Err(AnalysisError::RemoteJob(message.clone()));
                    }
                    if status.is_complete() {
                        info!("Job {} finished ({}/{})", job.job_id, status.progress, status.total);
                        return Ok(status);
                    }
                    debug!("Job {} progress {}/{} ({})", job.job_id, status.progress, status.total, status.status);
                    self.settings.poll_interval
                }
                Err(e) if e.is_transient() && transient_failures < policy.max_retries => {
                    transient_failures += 1;
                    run.retry_count += 1;
                    warn!("Transient error polling job {} (retry {}/{}): {}", job.job_id, transient_failures, policy.max_retries, e);
                    policy.backoff(transient_failures)
                }
                Err(e) if e.is_transient() => {
                    return Err(AnalysisError::TransientConnection { phase, attempts: transient_failures + 1, source: e });
                }
                Err(e) => return Err(AnalysisError::from_engine(phase, e)),
            };

            let waited = self.clock.now() - started;
            if waited >= self.settings.max_wait {
                warn!("Job {} still running after {:?}", job.job_id, waited);
                self.abandon_job(engine, job).await;
                return Err(AnalysisError::Timeout { phase, waited });
            }

            let remaining = self.settings.max_wait - waited;
            if let Err(cancelled) = self.pause(delay.min(remaining), phase, Some(cancel)).await {
                self.abandon_job(engine, job).await;
                return Err(cancelled);
            }
        }
    }

    /// Ask the engine to kill a job we stopped waiting for, when it can
    async fn abandon_job(&self, engine: &EngineHandle, job: &JobHandle) {
        if !self.connection.supports_job_cancel() {
            return;
        }
        if let Err(e) = self.connection.cancel_job(engine, job).await {
            warn!("Failed to cancel job {}: {}", job.job_id, e);
        }
    }

    async fn store_results(
        &self,
        config: &AnalysisConfiguration,
        engine: &EngineHandle,
        job: &JobHandle,
        run: &mut AnalysisRun,
    ) -> AnalysisResult<()> {
        let request = StoreResultsRequest {
            job_ids: vec![job.job_id.clone()],
            database: self.settings.database.clone(),
            target_collection: config.target_collection().to_string(),
            attribute_names: vec![config.result_field().to_string()],
        };

        let outcome = self
            .connection
            .store_results(engine, &request)
            .await
            .map_err(|e| AnalysisError::from_engine(RunStatus::StoringResults, e))?;

        run.documents_updated = outcome.documents_written;
        run.results_stored = outcome.documents_written > 0;
        info!(
            "Stored {} documents into {}.{}",
            outcome.documents_written,
            config.target_collection(),
            config.result_field()
        );

        if outcome.documents_written == 0 && run.vertex_count > 0 {
            return Err(AnalysisError::NoResultsWritten {
                collection: config.target_collection().to_string(),
                vertex_count: run.vertex_count,
            });
        }
        Ok(())
    }

    async fn validate(&self, config: &AnalysisConfiguration, run: &mut AnalysisRun) -> AnalysisResult<()> {
        let phase = RunStatus::Validating;
        let database = self.settings.database.as_str();
        let collection = config.target_collection();

        let sample = self
            .with_retry(phase, &mut run.retry_count, None, || {
                self.results.sample_results(database, collection, self.settings.validation_sample_size)
            })
            .await?;

        let distinct_values = if config.algorithm().is_partition() {
            let field = config.result_field();
            Some(
                self.with_retry(phase, &mut run.retry_count, None, || {
                    self.results.count_distinct(database, collection, field)
                })
                .await?,
            )
        } else {
            None
        };

        let report = validate_results(
            config,
            &ResultSet { sample: &sample, distinct_values, vertex_count: run.vertex_count },
        );
        run.validation = Some(report.clone());

        if report.passed() {
            info!("Validation passed ({} documents sampled)", report.sample_size);
            Ok(())
        } else {
            Err(AnalysisError::Validation(report))
        }
    }

    /// Record runtime and estimated cost; only managed engines owned by this
    /// run are billed to it
    fn settle_cost(&self, run: &mut AnalysisRun, lease: &EngineLease) {
        if lease.borrowed || self.connection.deployment_mode() != DeploymentMode::Managed {
            return;
        }
        let Some(started) = lease.deploy_started else {
            return;
        };

        let minutes = (self.clock.now() - started).as_secs_f64() / 60.0;
        let size = lease
            .engine
            .as_ref()
            .and_then(|engine| engine.size)
            .unwrap_or(lease.size);
        let estimate = self.settings.cost_table.estimate(DeploymentMode::Managed, size, minutes);

        run.engine_runtime_minutes = minutes;
        run.estimated_cost_usd = estimate.total_usd;
        debug!("Engine runtime {:.2} min on {} -> ${:.4}", minutes, size, estimate.total_usd);
    }

    /// Release a managed engine this run deployed. Failures are logged and
    /// never change the run outcome.
    async fn teardown(&self, lease: &EngineLease) {
        if lease.borrowed || self.connection.deployment_mode() != DeploymentMode::Managed {
            return;
        }
        if let Some(engine) = &lease.engine {
            match self.connection.delete_engine(engine).await {
                Ok(()) => info!("Released engine {}", engine.id),
                Err(e) => warn!("Failed to release engine {}: {}", engine.id, e),
            }
        }
    }
}
