//! Analysis configurations
//!
//! An `AnalysisConfiguration` describes one requested analysis: which
//! collections to load, which algorithm to run with which parameters, and
//! where to write the results. Values are validated when constructed and are
//! read-only afterwards.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use graph_engine_client::{AlgorithmKind, EngineSize};

/// Configuration errors, raised before any remote call is made
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Analysis name must not be empty")]
    EmptyName,

    #[error("Analysis '{0}' has no vertex collections")]
    EmptyVertexCollections(String),

    #[error("Analysis '{0}' has no target collection")]
    MissingTargetCollection(String),

    #[error("Invalid parameter '{parameter}' for {algorithm}: {reason}")]
    InvalidParameter {
        algorithm: AlgorithmKind,
        parameter: String,
        reason: String,
    },

    #[error("Result field '{field}' collides with the analysis name; expected '{expected}'")]
    ResultFieldCollision { field: String, expected: String },

    #[error("Analysis '{name}' requests collections {requested:?} but graph {graph_id} holds {loaded:?}")]
    GraphMismatch {
        name: String,
        graph_id: String,
        requested: Vec<String>,
        loaded: Vec<String>,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Standard attribute name under which each algorithm's output is stored
pub fn canonical_result_field(algorithm: AlgorithmKind) -> &'static str {
    match algorithm {
        AlgorithmKind::Wcc | AlgorithmKind::Scc => "component",
        AlgorithmKind::Pagerank => "rank",
        AlgorithmKind::LabelPropagation => "community",
        AlgorithmKind::Betweenness => "centrality",
    }
}

/// Resolve the result field once. An override equal to the display name is
/// rejected unless it already is the standard field.
fn resolve_result_field(name: &str, algorithm: AlgorithmKind, requested: Option<&str>) -> ConfigResult<String> {
    let canonical = canonical_result_field(algorithm);
    match requested.map(str::trim) {
        None | Some("") => Ok(canonical.to_string()),
        Some(field) if field == canonical => Ok(canonical.to_string()),
        Some(field) if field == name.trim() => Err(ConfigError::ResultFieldCollision {
            field: field.to_string(),
            expected: canonical.to_string(),
        }),
        Some(field) => Ok(field.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
enum ParamKind {
    /// Number in (0, 1]
    Probability,
    /// Integer >= 1
    PositiveInt,
    Bool,
    Text,
}

#[derive(Debug, Clone, Copy)]
enum ParamDefault {
    Absent,
    Float(f64),
    Int(u64),
    Bool(bool),
    Str(&'static str),
}

struct ParamSpec {
    name: &'static str,
    kind: ParamKind,
    default: ParamDefault,
}

const PAGERANK_PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "damping_factor", kind: ParamKind::Probability, default: ParamDefault::Float(0.85) },
    ParamSpec { name: "maximum_supersteps", kind: ParamKind::PositiveInt, default: ParamDefault::Int(100) },
];

const LABEL_PROPAGATION_PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "start_label_attribute", kind: ParamKind::Text, default: ParamDefault::Str("_key") },
    ParamSpec { name: "synchronous", kind: ParamKind::Bool, default: ParamDefault::Bool(false) },
    ParamSpec { name: "random_tiebreak", kind: ParamKind::Bool, default: ParamDefault::Bool(false) },
    ParamSpec { name: "maximum_supersteps", kind: ParamKind::PositiveInt, default: ParamDefault::Int(100) },
];

const BETWEENNESS_PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "maximum_supersteps", kind: ParamKind::PositiveInt, default: ParamDefault::Int(100) },
    ParamSpec { name: "sample_size", kind: ParamKind::PositiveInt, default: ParamDefault::Absent },
];

fn param_specs(algorithm: AlgorithmKind) -> &'static [ParamSpec] {
    match algorithm {
        AlgorithmKind::Pagerank => PAGERANK_PARAMS,
        AlgorithmKind::LabelPropagation => LABEL_PROPAGATION_PARAMS,
        AlgorithmKind::Betweenness => BETWEENNESS_PARAMS,
        AlgorithmKind::Wcc | AlgorithmKind::Scc => &[],
    }
}

fn check_param(algorithm: AlgorithmKind, spec: &ParamSpec, value: &Value) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidParameter {
        algorithm,
        parameter: spec.name.to_string(),
        reason: reason.to_string(),
    };

    match spec.kind {
        ParamKind::Probability => match value.as_f64() {
            Some(v) if v > 0.0 && v <= 1.0 => Ok(()),
            Some(_) => Err(invalid("must be in (0, 1]")),
            None => Err(invalid("must be a number")),
        },
        ParamKind::PositiveInt => match value.as_u64() {
            Some(v) if v >= 1 => Ok(()),
            _ => Err(invalid("must be a positive integer")),
        },
        ParamKind::Bool => value.as_bool().map(|_| ()).ok_or_else(|| invalid("must be a boolean")),
        ParamKind::Text => match value.as_str() {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(invalid("must be a non-empty string")),
        },
    }
}

/// Check parameters against the algorithm's accepted keys and fill defaults
fn validate_params(algorithm: AlgorithmKind, params: Map<String, Value>) -> ConfigResult<Map<String, Value>> {
    let specs = param_specs(algorithm);

    for key in params.keys() {
        if !specs.iter().any(|s| s.name == key) {
            return Err(ConfigError::InvalidParameter {
                algorithm,
                parameter: key.clone(),
                reason: "not accepted by this algorithm".to_string(),
            });
        }
    }

    let mut validated = params;
    for spec in specs {
        match validated.get(spec.name) {
            Some(value) => check_param(algorithm, spec, value)?,
            None => {
                let default = match spec.default {
                    ParamDefault::Absent => continue,
                    ParamDefault::Float(f) => Value::from(f),
                    ParamDefault::Int(i) => Value::from(i),
                    ParamDefault::Bool(b) => Value::from(b),
                    ParamDefault::Str(s) => Value::from(s),
                };
                validated.insert(spec.name.to_string(), default);
            }
        }
    }
    Ok(validated)
}

/// Immutable description of one requested analysis.
///
/// Construct with [`AnalysisConfiguration::builder`] or deserialize from
/// YAML/JSON; both paths run the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnalysisConfiguration")]
pub struct AnalysisConfiguration {
    name: String,
    description: String,
    vertex_collections: IndexSet<String>,
    edge_collections: IndexSet<String>,
    algorithm: AlgorithmKind,
    algorithm_params: Map<String, Value>,
    engine_size: EngineSize,
    target_collection: String,
    result_field: String,
}

impl AnalysisConfiguration {
    pub fn builder(name: impl Into<String>, algorithm: AlgorithmKind) -> AnalysisConfigurationBuilder {
        AnalysisConfigurationBuilder {
            name: name.into(),
            description: String::new(),
            vertex_collections: IndexSet::new(),
            edge_collections: IndexSet::new(),
            algorithm,
            algorithm_params: Map::new(),
            engine_size: EngineSize::default(),
            target_collection: String::new(),
            result_field: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn vertex_collections(&self) -> &IndexSet<String> {
        &self.vertex_collections
    }

    pub fn edge_collections(&self) -> &IndexSet<String> {
        &self.edge_collections
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    /// Validated parameters with defaults filled in
    pub fn algorithm_params(&self) -> &Map<String, Value> {
        &self.algorithm_params
    }

    pub fn engine_size(&self) -> EngineSize {
        self.engine_size
    }

    pub fn target_collection(&self) -> &str {
        &self.target_collection
    }

    /// Attribute the results are stored under; derived from the algorithm
    /// unless explicitly overridden
    pub fn result_field(&self) -> &str {
        &self.result_field
    }

    /// Re-check every construction invariant
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.vertex_collections.is_empty() {
            return Err(ConfigError::EmptyVertexCollections(self.name.clone()));
        }
        if self.target_collection.trim().is_empty() {
            return Err(ConfigError::MissingTargetCollection(self.name.clone()));
        }
        validate_params(self.algorithm, self.algorithm_params.clone())?;
        resolve_result_field(&self.name, self.algorithm, Some(&self.result_field))?;
        Ok(())
    }
}

/// Builder for [`AnalysisConfiguration`]
#[derive(Debug, Clone)]
pub struct AnalysisConfigurationBuilder {
    name: String,
    description: String,
    vertex_collections: IndexSet<String>,
    edge_collections: IndexSet<String>,
    algorithm: AlgorithmKind,
    algorithm_params: Map<String, Value>,
    engine_size: EngineSize,
    target_collection: String,
    result_field: Option<String>,
}

impl AnalysisConfigurationBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn vertex_collection(mut self, collection: impl Into<String>) -> Self {
        self.vertex_collections.insert(collection.into());
        self
    }

    pub fn vertex_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vertex_collections.extend(collections.into_iter().map(Into::into));
        self
    }

    pub fn edge_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edge_collections.extend(collections.into_iter().map(Into::into));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.algorithm_params.insert(key.into(), value.into());
        self
    }

    pub fn engine_size(mut self, size: EngineSize) -> Self {
        self.engine_size = size;
        self
    }

    pub fn target_collection(mut self, collection: impl Into<String>) -> Self {
        self.target_collection = collection.into();
        self
    }

    /// Explicitly override the stored attribute name
    pub fn result_field(mut self, field: impl Into<String>) -> Self {
        self.result_field = Some(field.into());
        self
    }

    pub fn build(self) -> ConfigResult<AnalysisConfiguration> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.vertex_collections.is_empty() {
            return Err(ConfigError::EmptyVertexCollections(name));
        }
        let target_collection = self.target_collection.trim().to_string();
        if target_collection.is_empty() {
            return Err(ConfigError::MissingTargetCollection(name));
        }

        let algorithm_params = validate_params(self.algorithm, self.algorithm_params)?;
        let result_field = resolve_result_field(&name, self.algorithm, self.result_field.as_deref())?;

        Ok(AnalysisConfiguration {
            name,
            description: self.description,
            vertex_collections: self.vertex_collections,
            edge_collections: self.edge_collections,
            algorithm: self.algorithm,
            algorithm_params,
            engine_size: self.engine_size,
            target_collection,
            result_field,
        })
    }
}

/// Wire form of an analysis configuration, before validation
#[derive(Debug, Deserialize)]
struct RawAnalysisConfiguration {
    name: String,
    #[serde(default)]
    description: String,
    vertex_collections: Vec<String>,
    #[serde(default)]
    edge_collections: Vec<String>,
    algorithm: String,
    #[serde(default)]
    algorithm_params: Map<String, Value>,
    #[serde(default)]
    engine_size: EngineSize,
    target_collection: String,
    #[serde(default)]
    result_field: Option<String>,
}

impl TryFrom<RawAnalysisConfiguration> for AnalysisConfiguration {
    type Error = ConfigError;

    fn try_from(raw: RawAnalysisConfiguration) -> ConfigResult<Self> {
        let algorithm = AlgorithmKind::from_name(&raw.algorithm)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(raw.algorithm.clone()))?;

        let mut builder = AnalysisConfiguration::builder(raw.name, algorithm)
            .description(raw.description)
            .vertex_collections(raw.vertex_collections)
            .edge_collections(raw.edge_collections)
            .engine_size(raw.engine_size)
            .target_collection(raw.target_collection);
        builder.algorithm_params = raw.algorithm_params;
        if let Some(field) = raw.result_field {
            builder = builder.result_field(field);
        }
        builder.build()
    }
}
