//! Shared HTTP transport
//!
//! Both deployment variants speak JSON over HTTP with an optional bearer
//! token. Error bodies are expected to look like `{"error": "..."}`.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Per-request timeout applied to every call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(token: Option<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, token })
    }

    /// Join a base URL and a relative path with exactly one slash
    pub fn url(base: &str, path: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> EngineResult<T> {
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::decode(response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> EngineResult<T> {
        debug!("POST {}", url);
        let response = self.authorize(self.client.post(url)).json(body).send().await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, url: &str) -> EngineResult<()> {
        debug!("DELETE {}", url);
        let response = self.authorize(self.client.delete(url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> EngineResult<T> {
        if response.status().is_success() {
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: Response) -> EngineError {
        let status = response.status();
        let error_body: serde_json::Value = response.json().await
            .unwrap_or_else(|_| serde_json::json!({"error": "Unknown error"}));
        let message = error_body.get("error")
            .or_else(|| error_body.get("errorMessage"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error")
            .to_string();

        match status {
            StatusCode::NOT_FOUND => EngineError::NotFound(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EngineError::Transient(message),
            _ => EngineError::Api { status: status.as_u16(), message },
        }
    }
}
