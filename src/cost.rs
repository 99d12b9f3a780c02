//! Cost model for managed engine deployments

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use graph_engine_client::{DeploymentMode, EngineSize};

/// Deployment fee plus per-minute rates by engine size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Flat fee charged once per managed deployment
    pub deployment_cost_usd: f64,
    /// Runtime rate in USD per minute
    pub per_minute_usd: BTreeMap<EngineSize, f64>,
}

impl Default for CostTable {
    fn default() -> Self {
        let per_minute_usd = BTreeMap::from([
            (EngineSize::XSmall, 0.0083),
            (EngineSize::Small, 0.0167),
            (EngineSize::Medium, 0.0333),
            (EngineSize::Large, 0.0667),
            (EngineSize::XLarge, 0.1333),
        ]);
        Self { deployment_cost_usd: 0.05, per_minute_usd }
    }
}

/// Estimated cost of one run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub deployment_usd: f64,
    pub runtime_usd: f64,
    pub total_usd: f64,
}

impl CostTable {
    pub fn rate_per_minute(&self, size: EngineSize) -> f64 {
        match self.per_minute_usd.get(&size) {
            Some(rate) => *rate,
            None => {
                warn!("No cost rate configured for engine size {}", size);
                0.0
            }
        }
    }

    /// `deployment + runtime_minutes * rate(size)`; zero for self-managed engines
    pub fn estimate(&self, mode: DeploymentMode, size: EngineSize, runtime_minutes: f64) -> CostEstimate {
        match mode {
            DeploymentMode::SelfManaged => CostEstimate::default(),
            DeploymentMode::Managed => {
                let deployment_usd = self.deployment_cost_usd;
                let runtime_usd = runtime_minutes.max(0.0) * self.rate_per_minute(size);
                CostEstimate {
                    deployment_usd,
                    runtime_usd,
                    total_usd: deployment_usd + runtime_usd,
                }
            }
        }
    }
}
