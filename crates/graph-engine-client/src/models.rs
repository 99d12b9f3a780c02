//! Data models for the engine client
//!
//! These types mirror the engine's request/response payloads and are shared
//! by both deployment variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Graph algorithms the engine can run as opaque jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Pagerank,
    Wcc,
    Scc,
    LabelPropagation,
    Betweenness,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 5] = [
        AlgorithmKind::Pagerank,
        AlgorithmKind::Wcc,
        AlgorithmKind::Scc,
        AlgorithmKind::LabelPropagation,
        AlgorithmKind::Betweenness,
    ];

    /// Lowercase identifier used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Pagerank => "pagerank",
            AlgorithmKind::Wcc => "wcc",
            AlgorithmKind::Scc => "scc",
            AlgorithmKind::LabelPropagation => "label_propagation",
            AlgorithmKind::Betweenness => "betweenness",
        }
    }

    /// Path segment of the engine's job submission endpoint
    pub fn endpoint(&self) -> &'static str {
        match self {
            AlgorithmKind::Pagerank => "pagerank",
            AlgorithmKind::Wcc => "wcc",
            AlgorithmKind::Scc => "scc",
            AlgorithmKind::LabelPropagation => "labelpropagation",
            AlgorithmKind::Betweenness => "betweennesscentrality",
        }
    }

    /// Parse an identifier, accepting the common spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pagerank" | "page_rank" => Some(AlgorithmKind::Pagerank),
            "wcc" | "weakly_connected_components" => Some(AlgorithmKind::Wcc),
            "scc" | "strongly_connected_components" => Some(AlgorithmKind::Scc),
            "label_propagation" | "labelpropagation" => Some(AlgorithmKind::LabelPropagation),
            "betweenness" | "betweenness_centrality" => Some(AlgorithmKind::Betweenness),
            _ => None,
        }
    }

    /// Partition algorithms group vertices into components
    pub fn is_partition(&self) -> bool {
        matches!(self, AlgorithmKind::Wcc | AlgorithmKind::Scc)
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine size hint for managed deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSize {
    XSmall,
    Small,
    Medium,
    Large,
    XLarge,
}

impl EngineSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineSize::XSmall => "xsmall",
            EngineSize::Small => "small",
            EngineSize::Medium => "medium",
            EngineSize::Large => "large",
            EngineSize::XLarge => "xlarge",
        }
    }

    /// Size identifier understood by the managed control plane
    pub fn size_id(&self) -> &'static str {
        match self {
            EngineSize::XSmall => "e4",
            EngineSize::Small => "e8",
            EngineSize::Medium => "e16",
            EngineSize::Large => "e32",
            EngineSize::XLarge => "e64",
        }
    }
}

impl Default for EngineSize {
    fn default() -> Self {
        EngineSize::Small
    }
}

impl fmt::Display for EngineSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine is provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Provisioned per analysis, billed for deployment and runtime
    Managed,
    /// Long-lived, pre-existing engine with no deployment step and no cost
    SelfManaged,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Managed => f.write_str("managed"),
            DeploymentMode::SelfManaged => f.write_str("self_managed"),
        }
    }
}

/// Opaque handle to a deployed or located engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHandle {
    /// Engine ID assigned by the service
    pub id: String,
    /// Base URL of the engine API
    pub endpoint: String,
    /// Whether the engine accepts requests
    pub ready: bool,
    /// Size the engine was deployed with (managed only)
    #[serde(default)]
    pub size: Option<EngineSize>,
    /// When provisioning started (managed only)
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Named graph selector for load requests.
///
/// `None` serializes as an explicit `null`, telling the engine to load
/// strictly the listed collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum NamedGraph {
    #[default]
    None,
    Named(String),
}

impl From<Option<String>> for NamedGraph {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => NamedGraph::Named(name),
            None => NamedGraph::None,
        }
    }
}

impl From<NamedGraph> for Option<String> {
    fn from(value: NamedGraph) -> Self {
        match value {
            NamedGraph::Named(name) => Some(name),
            NamedGraph::None => None,
        }
    }
}

/// Request body for loading collections into engine memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadGraphRequest {
    pub database: String,
    pub vertex_collections: Vec<String>,
    pub edge_collections: Vec<String>,
    /// Always serialized, `null` when no named graph is requested
    pub graph_name: NamedGraph,
}

impl LoadGraphRequest {
    /// Load exactly the given collections, never an enclosing named graph
    pub fn collections(
        database: impl Into<String>,
        vertex_collections: impl IntoIterator<Item = impl Into<String>>,
        edge_collections: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            database: database.into(),
            vertex_collections: vertex_collections.into_iter().map(Into::into).collect(),
            edge_collections: edge_collections.into_iter().map(Into::into).collect(),
            graph_name: NamedGraph::None,
        }
    }
}

/// A graph loaded into engine memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub graph_id: String,
    pub vertex_count: u64,
    pub edge_count: u64,
}

/// Handle to a submitted algorithm job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
}

/// Progress report for a running job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub progress: u64,
    pub total: u64,
    /// Free-text status; informational only
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    /// Completion is decided by the counter pair, never by `status`.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.progress >= self.total
    }
}

/// Request body for writing job results back to durable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResultsRequest {
    pub job_ids: Vec<String>,
    pub database: String,
    pub target_collection: String,
    pub attribute_names: Vec<String>,
}

/// Outcome of a store request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub documents_written: u64,
}

/// A stored result document.
///
/// `id` is the source vertex identifier in `collection/key` form. Results
/// written back into the vertex collection itself carry no `id` attribute,
/// so the document's own `_id` stands in for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ResultDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for ResultDocument {
    type Error = String;

    fn try_from(mut fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => return Err(format!("result document id must be a string, got {}", other)),
            None => match fields.get("_id") {
                Some(Value::String(id)) => id.clone(),
                _ => return Err("result document has neither `id` nor `_id`".to_string()),
            },
        };
        Ok(Self { id, fields })
    }
}

impl ResultDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: Map::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Collection part of the source vertex identifier
    pub fn collection(&self) -> &str {
        match self.id.split_once('/') {
            Some((collection, _)) => collection,
            None => "",
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
