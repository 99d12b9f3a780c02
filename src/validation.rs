//! Post-execution result validation
//!
//! Pure checks over a sample of stored results plus the originating
//! configuration. All checks run on every validation so one report lists
//! every problem found.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use graph_engine_client::{AlgorithmKind, ResultDocument};
use indexmap::IndexSet;

use crate::analysis::AnalysisConfiguration;

/// Default number of stored documents inspected per run
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Document IDs quoted in a failure message
const MAX_REPORTED_IDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    ResultField,
    PartitionStructure,
    CollectionContainment,
}

/// Why a check failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckFailure {
    /// Vertices were loaded but nothing could be sampled
    EmptySample { collection: String },
    /// Sampled documents lack the expected result attribute
    MissingResultField {
        field: String,
        missing: usize,
        examples: Vec<String>,
    },
    /// Every vertex ended up in its own partition
    DegeneratePartition { distinct_values: u64, vertex_count: u64 },
    /// Sampled documents come from collections that were not requested
    ForeignCollection {
        collections: Vec<String>,
        documents: usize,
    },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::EmptySample { collection } => {
                write!(f, "no result documents found in '{}'", collection)
            }
            CheckFailure::MissingResultField { field, missing, examples } => write!(
                f,
                "{} sampled document(s) lack result field '{}' (e.g. {})",
                missing,
                field,
                examples.join(", ")
            ),
            CheckFailure::DegeneratePartition { distinct_values, vertex_count } => write!(
                f,
                "degenerate partition: {} distinct values for {} vertices",
                distinct_values, vertex_count
            ),
            CheckFailure::ForeignCollection { collections, documents } => write!(
                f,
                "{} sampled document(s) from collections outside the analysis: {}",
                documents,
                collections.join(", ")
            ),
        }
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: ValidationCheck,
    pub failure: Option<CheckFailure>,
}

/// Aggregated outcome of all checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub sample_size: usize,
    pub checks: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.failure.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckFailure> {
        self.checks.iter().filter_map(|c| c.failure.as_ref())
    }

    pub fn failure_for(&self, check: ValidationCheck) -> Option<&CheckFailure> {
        self.checks.iter().find(|c| c.check == check).and_then(|c| c.failure.as_ref())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "all checks passed ({} documents sampled)", self.sample_size);
        }
        let messages: Vec<String> = self.failures().map(|failure| failure.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// What the validator looks at
#[derive(Debug, Clone, Copy)]
pub struct ResultSet<'a> {
    /// First N stored documents
    pub sample: &'a [ResultDocument],
    /// Distinct result values across the full collection, when known
    pub distinct_values: Option<u64>,
    /// Vertices loaded into the engine
    pub vertex_count: u64,
}

/// Every sampled document carries `field`
pub fn check_result_field(field: &str, results: &ResultSet<'_>, collection: &str) -> Result<(), CheckFailure> {
    if results.sample.is_empty() {
        if results.vertex_count > 0 {
            return Err(CheckFailure::EmptySample { collection: collection.to_string() });
        }
        return Ok(());
    }

    let missing: Vec<&ResultDocument> = results.sample.iter().filter(|doc| doc.get(field).is_none()).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CheckFailure::MissingResultField {
            field: field.to_string(),
            missing: missing.len(),
            examples: missing.iter().take(MAX_REPORTED_IDS).map(|doc| doc.id.clone()).collect(),
        })
    }
}

/// Partition algorithms must produce fewer distinct values than vertices.
///
/// Falls back to counting the sample when the full distinct count is unknown.
pub fn check_partition(algorithm: AlgorithmKind, field: &str, results: &ResultSet<'_>) -> Result<(), CheckFailure> {
    if !algorithm.is_partition() {
        return Ok(());
    }

    let distinct_values = match results.distinct_values {
        Some(count) => count,
        None => {
            let values: HashSet<String> = results.sample
                .iter()
                .filter_map(|doc| doc.get(field))
                .map(|value| value.to_string())
                .collect();
            values.len() as u64
        }
    };

    if distinct_values < results.vertex_count {
        Ok(())
    } else {
        Err(CheckFailure::DegeneratePartition { distinct_values, vertex_count: results.vertex_count })
    }
}

/// Every sampled document's source vertex belongs to a requested collection
pub fn check_containment(vertex_collections: &IndexSet<String>, results: &ResultSet<'_>) -> Result<(), CheckFailure> {
    let mut foreign = BTreeSet::new();
    let mut documents = 0;
    for doc in results.sample {
        let collection = doc.collection();
        if !vertex_collections.contains(collection) {
            foreign.insert(if collection.is_empty() { doc.id.clone() } else { collection.to_string() });
            documents += 1;
        }
    }

    if foreign.is_empty() {
        Ok(())
    } else {
        Err(CheckFailure::ForeignCollection { collections: foreign.into_iter().collect(), documents })
    }
}

/// Run every check and collect all failures
pub fn validate_results(config: &AnalysisConfiguration, results: &ResultSet<'_>) -> ValidationReport {
    let field = config.result_field();
    let checks = vec![
        CheckOutcome {
            check: ValidationCheck::ResultField,
            failure: check_result_field(field, results, config.target_collection()).err(),
        },
        CheckOutcome {
            check: ValidationCheck::PartitionStructure,
            failure: check_partition(config.algorithm(), field, results).err(),
        },
        CheckOutcome {
            check: ValidationCheck::CollectionContainment,
            failure: check_containment(config.vertex_collections(), results).err(),
        },
    ];

    ValidationReport { sample_size: results.sample.len(), checks }
}
