//! Test Scenarios
//!
//! Short scenario names for Docker-backed runs of the harness

pub mod latency;
pub mod smoke;

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chaosspec::{Harness, HarnessConfig, Suite};

pub struct TestScenarios {
    config: HarnessConfig,
}

impl TestScenarios {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Configuration from `.env` and `CHAOSSPEC_*` variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(HarnessConfig::from_env()?))
    }

    /// Run a specific scenario by name
    pub async fn run_scenario(&self, name: &str) -> Result<()> {
        match name {
            "smoke" => self.run_suite("smoke", smoke::run).await,
            "latency" => self.run_suite("latency", latency::run).await,

            "all" => {
                tracing::info!("🧪 Running all scenarios");
                self.run_suite("smoke", smoke::run).await?;
                self.run_suite("latency", latency::run).await?;
                tracing::info!("🏆 All scenarios completed");
                Ok(())
            }

            _ => Err(anyhow!(
                "Unknown test scenario: '{}'. Available: {}",
                name,
                Self::available_scenarios().join(", ")
            )),
        }
    }

    /// Get list of available scenarios
    pub fn available_scenarios() -> Vec<&'static str> {
        vec!["smoke", "latency", "all"]
    }

    /// Run `body` as the only test of a chaos suite with its own harness
    async fn run_suite<F, Fut>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(Harness) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let suite = Arc::new(Suite::new(format!("tester/{name}_chaos.rs")));
        let harness = Harness::builder()
            .config(self.config.clone())
            .framework(suite.clone())
            .build()?;

        harness.autowire().await?;

        let outcome = suite.test(name, move || body(harness)).await;
        let finished = suite.finish().await;

        outcome?;
        finished
    }
}
