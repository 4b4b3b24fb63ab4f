//! Harness context
//!
//! Wires one cleanup registry, fault manager, hook armer and service factory
//! together. Clone it freely; clones share all state.

use std::fmt;
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::core::{
    inject_latency, remove_all_toxics, AdminConnector, CleanupRegistry, DrainReport, HookArmer,
    NetworkFaultManager, ServiceFactory, ServiceHandle, ServiceOptions,
};
use crate::error::HarnessResult;
use crate::services::{DockerCli, Standalone, ToxiproxyClient};
use crate::traits::{ContainerRuntime, ProxyAdmin, TestFramework};
use crate::types::{HookMode, Stream};

#[derive(Clone)]
pub struct Harness {
    config: HarnessConfig,
    registry: CleanupRegistry,
    manager: NetworkFaultManager,
    armer: HookArmer,
    factory: ServiceFactory,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &NetworkFaultManager {
        &self.manager
    }

    pub fn armer(&self) -> &HookArmer {
        &self.armer
    }

    pub fn factory(&self) -> &ServiceFactory {
        &self.factory
    }

    pub async fn create_service(
        &self,
        name: &str,
        options: ServiceOptions,
    ) -> HarnessResult<ServiceHandle> {
        self.factory.create_service(name, options).await
    }

    pub async fn inject_latency(
        &self,
        proxy_name: &str,
        latency_ms: u64,
        jitter_ms: u64,
        stream: Stream,
    ) -> HarnessResult<()> {
        inject_latency(&self.manager, proxy_name, latency_ms, jitter_ms, stream).await
    }

    pub async fn remove_all_toxics(&self, proxy_name: &str) -> HarnessResult<()> {
        remove_all_toxics(&self.manager, proxy_name).await
    }

    pub async fn ensure_hooks(&self) -> HarnessResult<HookMode> {
        self.armer.ensure_hooks().await
    }

    pub async fn autowire(&self) -> HarnessResult<bool> {
        self.armer.autowire().await
    }

    pub async fn start(&self) -> HarnessResult<()> {
        self.manager.start().await
    }

    pub async fn stop(&self) -> HarnessResult<()> {
        self.manager.stop().await
    }

    pub async fn reset(&self) -> HarnessResult<()> {
        self.manager.reset().await
    }

    pub async fn cleanup_after_each_test(&self) -> DrainReport {
        self.registry.cleanup_after_each_test().await
    }

    pub async fn cleanup_after_suite(&self) -> DrainReport {
        self.registry.cleanup_after_suite().await
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Builder for `Harness`; every collaborator has a production default
#[derive(Default)]
pub struct HarnessBuilder {
    config: Option<HarnessConfig>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    connector: Option<AdminConnector>,
    framework: Option<Arc<dyn TestFramework>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn connector(mut self, connector: AdminConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn framework(mut self, framework: Arc<dyn TestFramework>) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn build(self) -> HarnessResult<Harness> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(DockerCli::new(&config)));
        let connector = self.connector.unwrap_or_else(toxiproxy_connector);
        let framework = self.framework.unwrap_or_else(|| Arc::new(Standalone));

        let registry = CleanupRegistry::new();
        let manager = NetworkFaultManager::new(
            config.clone(),
            runtime.clone(),
            connector,
            registry.clone(),
        );
        let armer = HookArmer::new(
            framework,
            manager.clone(),
            registry.clone(),
            &config.autowire_pattern,
        )?;
        let factory = ServiceFactory::new(
            config.clone(),
            runtime,
            armer.clone(),
            manager.clone(),
            registry.clone(),
        );

        Ok(Harness {
            config,
            registry,
            manager,
            armer,
            factory,
        })
    }
}

fn toxiproxy_connector() -> AdminConnector {
    Arc::new(|admin_url: &str| -> HarnessResult<Arc<dyn ProxyAdmin>> {
        let client: Arc<dyn ProxyAdmin> = Arc::new(ToxiproxyClient::new(admin_url)?);
        Ok(client)
    })
}
