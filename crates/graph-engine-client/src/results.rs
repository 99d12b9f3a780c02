//! Read access to stored algorithm results
//!
//! Results live in the database, not in the engine, so validation reads them
//! through a separate trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{EngineError, EngineResult};
use crate::http::HttpTransport;
use crate::models::ResultDocument;

/// Reader for documents written by `store_results`
#[async_trait]
pub trait ResultReader: Send + Sync {
    /// Up to `limit` documents from the target collection, in storage order
    async fn sample_results(&self, database: &str, collection: &str, limit: usize) -> EngineResult<Vec<ResultDocument>>;

    /// Number of distinct values of `field` across the whole collection
    async fn count_distinct(&self, database: &str, collection: &str, field: &str) -> EngineResult<u64>;
}

#[derive(Serialize)]
struct CursorRequest<'a> {
    query: &'a str,
    #[serde(rename = "bindVars")]
    bind_vars: Value,
}

#[derive(Deserialize)]
struct CursorResponse<T> {
    result: Vec<T>,
}

const SAMPLE_QUERY: &str = "FOR d IN @@collection LIMIT @limit RETURN d";
const DISTINCT_QUERY: &str =
    "RETURN LENGTH(FOR d IN @@collection FILTER HAS(d, @field) COLLECT v = d.@field RETURN 1)";

/// Reads results through the database's AQL cursor endpoint.
pub struct DatabaseResultReader {
    database_url: String,
    transport: HttpTransport,
}

impl DatabaseResultReader {
    pub fn new(database_url: &str, token: Option<String>) -> EngineResult<Self> {
        Ok(Self {
            database_url: database_url.trim_end_matches('/').to_string(),
            transport: HttpTransport::new(token)?,
        })
    }

    async fn cursor<T: serde::de::DeserializeOwned>(&self, database: &str, query: &str, bind_vars: Value) -> EngineResult<Vec<T>> {
        let url = HttpTransport::url(&self.database_url, &format!("_db/{}/_api/cursor", database));
        let response: CursorResponse<T> = self.transport
            .post(&url, &CursorRequest { query, bind_vars })
            .await
            .map_err(|e| match e {
                EngineError::NotFound(msg) => EngineError::CollectionNotFound(msg),
                other => other,
            })?;
        Ok(response.result)
    }
}

#[async_trait]
impl ResultReader for DatabaseResultReader {
    async fn sample_results(&self, database: &str, collection: &str, limit: usize) -> EngineResult<Vec<ResultDocument>> {
        self.cursor(database, SAMPLE_QUERY, json!({ "@collection": collection, "limit": limit })).await
    }

    async fn count_distinct(&self, database: &str, collection: &str, field: &str) -> EngineResult<u64> {
        let counts: Vec<u64> = self
            .cursor(database, DISTINCT_QUERY, json!({ "@collection": collection, "field": field }))
            .await?;
        Ok(counts.first().copied().unwrap_or(0))
    }
}
