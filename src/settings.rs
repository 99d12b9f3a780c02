//! Orchestrator settings
//!
//! Read once when an orchestrator is constructed: deployment mode, endpoints,
//! polling and retry policy, validation sample size and the cost table.
//! Loaded from YAML, then overridden by `GA_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use graph_engine_client::{
    DatabaseResultReader, DeploymentMode, EngineConnection, EngineError, ManagedConnection,
    ResultReader, SelfManagedConnection,
};

use crate::cost::CostTable;
use crate::orchestrator::retry::RetryPolicy;
use crate::validation::DEFAULT_SAMPLE_SIZE;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Connection setup failed: {0}")]
    Connection(#[from] EngineError),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn invalid(key: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid { key: key.to_string(), reason: reason.into() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub deployment_mode: DeploymentMode,
    /// Control-plane URL (managed) or engine endpoint (self-managed)
    pub engine_url: String,
    /// Database HTTP endpoint used to read stored results
    pub database_url: String,
    /// Database holding the analysed collections
    pub database: String,
    pub api_token: Option<String>,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound on waiting for one algorithm job
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    /// Upper bound on waiting for a managed engine to become ready
    #[serde(with = "humantime_serde")]
    pub deploy_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub deploy_poll_interval: Duration,

    pub retry: RetryPolicy,
    pub validation_sample_size: usize,
    /// Delete managed engines when a run finishes
    pub teardown_engine: bool,
    pub cost_table: CostTable,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            deployment_mode: DeploymentMode::SelfManaged,
            engine_url: "http://localhost:8829".to_string(),
            database_url: "http://localhost:8529".to_string(),
            database: "_system".to_string(),
            api_token: None,
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(3600),
            deploy_timeout: Duration::from_secs(600),
            deploy_poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            validation_sample_size: DEFAULT_SAMPLE_SIZE,
            teardown_engine: true,
            cost_table: CostTable::default(),
        }
    }
}

fn parse_duration(key: &str, value: &str) -> SettingsResult<Duration> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| invalid(key, e.to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> SettingsResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| invalid(key, e.to_string()))
}

impl OrchestratorSettings {
    pub fn from_yaml_str(yaml: &str) -> SettingsResult<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        info!("Loading orchestrator settings from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Apply `GA_*` variables from the process environment
    pub fn apply_env_overrides(self) -> SettingsResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> SettingsResult<Self> {
        if let Some(mode) = lookup("GA_DEPLOYMENT_MODE") {
            self.deployment_mode = match mode.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                "managed" => DeploymentMode::Managed,
                "self_managed" => DeploymentMode::SelfManaged,
                other => return Err(invalid("GA_DEPLOYMENT_MODE", format!("unknown mode '{}'", other))),
            };
        }
        if let Some(url) = lookup("GA_ENGINE_URL") {
            self.engine_url = url;
        }
        if let Some(url) = lookup("GA_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(database) = lookup("GA_DATABASE") {
            self.database = database;
        }
        if let Some(token) = lookup("GA_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(value) = lookup("GA_POLL_INTERVAL") {
            self.poll_interval = parse_duration("GA_POLL_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("GA_MAX_WAIT") {
            self.max_wait = parse_duration("GA_MAX_WAIT", &value)?;
        }
        if let Some(value) = lookup("GA_DEPLOY_TIMEOUT") {
            self.deploy_timeout = parse_duration("GA_DEPLOY_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("GA_MAX_RETRIES") {
            self.retry.max_retries = parse_number("GA_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("GA_VALIDATION_SAMPLE_SIZE") {
            self.validation_sample_size = parse_number("GA_VALIDATION_SAMPLE_SIZE", &value)?;
        }
        debug!("Settings after overrides: mode={}, engine={}", self.deployment_mode, self.engine_url);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> SettingsResult<()> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "must be greater than zero"));
        }
        if self.max_wait < self.poll_interval {
            return Err(invalid("max_wait", "must be at least poll_interval"));
        }
        if self.deployment_mode == DeploymentMode::Managed && self.deploy_poll_interval.is_zero() {
            return Err(invalid("deploy_poll_interval", "must be greater than zero"));
        }
        if self.validation_sample_size == 0 {
            return Err(invalid("validation_sample_size", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        if self.database.trim().is_empty() {
            return Err(invalid("database", "must not be empty"));
        }
        Ok(())
    }

    /// Build the engine connection for the configured deployment mode
    pub fn engine_connection(&self) -> SettingsResult<Arc<dyn EngineConnection>> {
        let connection: Arc<dyn EngineConnection> = match self.deployment_mode {
            DeploymentMode::Managed => Arc::new(ManagedConnection::new(&self.engine_url, self.api_token.clone())?),
            DeploymentMode::SelfManaged => Arc::new(SelfManagedConnection::new(&self.engine_url, self.api_token.clone())?),
        };
        Ok(connection)
    }

    /// Build the reader for stored results
    pub fn result_reader(&self) -> SettingsResult<Arc<dyn ResultReader>> {
        Ok(Arc::new(DatabaseResultReader::new(&self.database_url, self.api_token.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(OrchestratorSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let settings = OrchestratorSettings::from_yaml_str(
            "deployment_mode: managed\npoll_interval: 500ms\nmax_wait: 2m\nretry:\n  max_retries: 5\n",
        )
        .unwrap();
        assert_eq!(settings.deployment_mode, DeploymentMode::Managed);
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.max_wait, Duration::from_secs(120));
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.validation_sample_size, DEFAULT_SAMPLE_SIZE);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database: shop\nvalidation_sample_size: 25").unwrap();
        let settings = OrchestratorSettings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.database, "shop");
        assert_eq!(settings.validation_sample_size, 25);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GA_DEPLOYMENT_MODE", "managed"),
            ("GA_POLL_INTERVAL", "250ms"),
            ("GA_MAX_RETRIES", "7"),
            ("GA_DATABASE", "fraud"),
        ]);
        let settings = OrchestratorSettings::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.deployment_mode, DeploymentMode::Managed);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.retry.max_retries, 7);
        assert_eq!(settings.database, "fraud");
    }

    #[test]
    fn test_bad_override_rejected() {
        let err = OrchestratorSettings::default()
            .apply_overrides(|key| (key == "GA_DEPLOYMENT_MODE").then(|| "cloudy".to_string()))
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { ref key, .. } if key == "GA_DEPLOYMENT_MODE"));
    }

    #[test]
    fn test_max_wait_below_poll_interval() {
        let settings = OrchestratorSettings {
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(1),
            ..OrchestratorSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
