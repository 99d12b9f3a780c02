//! Sharing one loaded engine between several analyses
//!
//! Concurrent job submission against a single graph load is unsupported, so
//! every `SharedEngine` built for the same engine ID carries the same mutex
//! and the algorithm phase runs under it.

use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use graph_engine_client::{EngineHandle, GraphInfo};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::analysis::{AnalysisConfiguration, ConfigError, ConfigResult};

/// Registry of per-engine job locks
#[derive(Debug, Default)]
pub struct EngineLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EngineLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The job lock for one engine ID, created on first use
    pub fn lock_for(&self, engine_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(engine_id.to_string()).or_default())
    }

    /// Wrap an already-loaded engine/graph for reuse. `loaded_from` is the
    /// configuration whose collections were loaded into `graph`.
    pub fn share(&self, engine: EngineHandle, graph: GraphInfo, loaded_from: &AnalysisConfiguration) -> SharedEngine {
        let job_lock = self.lock_for(&engine.id);
        SharedEngine {
            engine,
            graph,
            vertex_collections: loaded_from.vertex_collections().clone(),
            edge_collections: loaded_from.edge_collections().clone(),
            job_lock,
        }
    }

    /// Forget the lock of a released engine
    pub fn remove(&self, engine_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(engine_id);
    }
}

/// An engine with a graph already loaded, usable by several analyses
#[derive(Debug, Clone)]
pub struct SharedEngine {
    engine: EngineHandle,
    graph: GraphInfo,
    vertex_collections: IndexSet<String>,
    edge_collections: IndexSet<String>,
    job_lock: Arc<AsyncMutex<()>>,
}

impl SharedEngine {
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn graph(&self) -> &GraphInfo {
        &self.graph
    }

    pub fn vertex_collections(&self) -> &IndexSet<String> {
        &self.vertex_collections
    }

    pub fn edge_collections(&self) -> &IndexSet<String> {
        &self.edge_collections
    }

    /// The loaded graph must hold exactly the collections `config` asks for
    pub fn check_collections(&self, config: &AnalysisConfiguration) -> ConfigResult<()> {
        if same_collections(&self.vertex_collections, config.vertex_collections())
            && same_collections(&self.edge_collections, config.edge_collections())
        {
            return Ok(());
        }
        Err(ConfigError::GraphMismatch {
            name: config.name().to_string(),
            graph_id: self.graph.graph_id.clone(),
            requested: config.vertex_collections().iter().chain(config.edge_collections()).cloned().collect(),
            loaded: self.vertex_collections.iter().chain(&self.edge_collections).cloned().collect(),
        })
    }

    /// Exclusive right to run a job on this engine
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.job_lock.lock().await
    }
}

fn same_collections(a: &IndexSet<String>, b: &IndexSet<String>) -> bool {
    a.len() == b.len() && a.iter().all(|collection| b.contains(collection))
}
