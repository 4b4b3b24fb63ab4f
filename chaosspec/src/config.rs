//! Harness Configuration
//!
//! Settings for the container runtime, the Toxiproxy admin service and the
//! proxies created on the shared network. Built with [`HarnessConfigBuilder`]
//! or loaded from the environment with [`HarnessConfig::from_env`].

use std::ops::Range;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarnessError, HarnessResult};

/// Matches test files that opt into automatic lifecycle hooks.
pub const DEFAULT_AUTOWIRE_PATTERN: &str = r"(\.chaos\.test\.[tj]sx?|_chaos(_test)?\.rs)$";

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Container CLI used to drive the runtime
    pub docker_binary: String,
    /// Host under which published container ports are reachable
    pub docker_host: String,
    pub admin_image: String,
    /// Network alias of the admin service; proxies are dialed through it
    pub admin_alias: String,
    pub admin_port: u16,
    pub network_prefix: String,
    /// Range that default proxy listen ports are drawn from
    pub listen_port_range: Range<u16>,
    /// Port used by `url()` when a service exposes no ports
    pub default_service_port: u16,
    pub startup_timeout: Duration,
    pub stop_timeout: Duration,
    pub autowire_pattern: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            docker_host: "localhost".to_string(),
            admin_image: "shopify/toxiproxy".to_string(),
            admin_alias: "toxiproxy".to_string(),
            admin_port: 8474,
            network_prefix: "chaosspec".to_string(),
            listen_port_range: 10000..30000,
            default_service_port: 80,
            startup_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(2),
            autowire_pattern: DEFAULT_AUTOWIRE_PATTERN.to_string(),
        }
    }
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::new()
    }

    /// Load overrides from `.env` and the process environment
    pub fn from_env() -> HarnessResult<Self> {
        // A missing .env file is fine
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(binary) = std::env::var("CHAOSSPEC_DOCKER") {
            config.docker_binary = binary;
        }
        if let Ok(host) = std::env::var("CHAOSSPEC_DOCKER_HOST") {
            config.docker_host = host;
        }
        if let Ok(image) = std::env::var("CHAOSSPEC_TOXIPROXY_IMAGE") {
            config.admin_image = image;
        }
        if let Ok(alias) = std::env::var("CHAOSSPEC_TOXIPROXY_ALIAS") {
            config.admin_alias = alias;
        }
        if let Ok(secs) = std::env::var("CHAOSSPEC_STARTUP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| HarnessError::config("CHAOSSPEC_STARTUP_TIMEOUT_SECS", &secs))?;
            config.startup_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.listen_port_range.is_empty() || self.listen_port_range.start == 0 {
            return Err(HarnessError::config(
                "listen_port_range",
                format!("{:?}", self.listen_port_range),
            ));
        }
        if self.admin_port == 0 {
            return Err(HarnessError::config("admin_port", self.admin_port));
        }
        if self.default_service_port == 0 {
            return Err(HarnessError::config(
                "default_service_port",
                self.default_service_port,
            ));
        }
        if self.admin_alias.trim().is_empty() {
            return Err(HarnessError::config("admin_alias", &self.admin_alias));
        }
        if Regex::new(&self.autowire_pattern).is_err() {
            return Err(HarnessError::config(
                "autowire_pattern",
                &self.autowire_pattern,
            ));
        }
        Ok(())
    }

    /// External URL of the admin API for a given published port
    pub fn admin_url(&self, mapped_port: u16) -> String {
        format!("http://{}:{}", self.docker_host, mapped_port)
    }
}

pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
        }
    }

    pub fn docker_binary<S: Into<String>>(mut self, binary: S) -> Self {
        self.config.docker_binary = binary.into();
        self
    }

    pub fn docker_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.docker_host = host.into();
        self
    }

    pub fn admin_image<S: Into<String>>(mut self, image: S) -> Self {
        self.config.admin_image = image.into();
        self
    }

    pub fn admin_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.config.admin_alias = alias.into();
        self
    }

    pub fn admin_port(mut self, port: u16) -> Self {
        self.config.admin_port = port;
        self
    }

    pub fn network_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.network_prefix = prefix.into();
        self
    }

    pub fn listen_port_range(mut self, range: Range<u16>) -> Self {
        self.config.listen_port_range = range;
        self
    }

    pub fn default_service_port(mut self, port: u16) -> Self {
        self.config.default_service_port = port;
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout = timeout;
        self
    }

    pub fn autowire_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.config.autowire_pattern = pattern.into();
        self
    }

    pub fn build(self) -> HarnessResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
