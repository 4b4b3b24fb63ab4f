//! Service Factory
//!
//! Entry point test code uses to run a service container on the shared
//! network, optionally fronted by fault-injection proxies.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::core::hooks::HookArmer;
use crate::core::manager::NetworkFaultManager;
use crate::core::registry::{CleanupRegistry, Scope};
use crate::error::{HarnessError, HarnessResult};
use crate::traits::ContainerRuntime;
use crate::types::{ContainerHandle, ContainerSpec, ExecOutput};

/// How to run a service
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub image: String,
    /// Ports to publish; the first is the default for `url()`
    pub ports: Vec<u16>,
    pub environment: HashMap<String, String>,
    /// Expose proxied dial addresses through `ServiceHandle::proxy`
    pub proxy: bool,
    /// Bucket that owns the service's teardown
    pub scope: Scope,
    /// Network alias; defaults to the service name
    pub alias: Option<String>,
    /// Overrides the image's default command
    pub command: Vec<String>,
}

impl ServiceOptions {
    pub fn new<S: Into<String>>(image: S) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn ports<I: IntoIterator<Item = u16>>(mut self, ports: I) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn proxy(mut self, enabled: bool) -> Self {
        self.proxy = enabled;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Clone)]
pub struct ServiceFactory {
    config: HarnessConfig,
    runtime: Arc<dyn ContainerRuntime>,
    armer: HookArmer,
    manager: NetworkFaultManager,
    registry: CleanupRegistry,
}

impl ServiceFactory {
    pub fn new(
        config: HarnessConfig,
        runtime: Arc<dyn ContainerRuntime>,
        armer: HookArmer,
        manager: NetworkFaultManager,
        registry: CleanupRegistry,
    ) -> Self {
        Self {
            config,
            runtime,
            armer,
            manager,
            registry,
        }
    }

    /// Start a service attached to the shared network.
    ///
    /// Arms lifecycle hooks first, so callers never have to. The service is
    /// stopped when its scope bucket is drained; stop failures are ignored.
    pub async fn create_service(
        &self,
        name: &str,
        options: ServiceOptions,
    ) -> HarnessResult<ServiceHandle> {
        self.armer.ensure_hooks().await?;

        let network = self.manager.network().await?;
        let alias = options.alias.clone().unwrap_or_else(|| name.to_string());

        let spec = ContainerSpec {
            image: options.image.clone(),
            exposed_ports: options.ports.clone(),
            environment: options.environment.clone(),
            network: Some(network.name),
            aliases: vec![alias.clone()],
            command: options.command.clone(),
        };

        let container = self.runtime.start_container(&spec).await?;
        info!("📦 Service '{}' ({}) is up as '{}'", name, options.image, alias);

        let runtime = self.runtime.clone();
        let owned = container.clone();
        let service_name = name.to_string();
        self.registry.register_in(options.scope, move || async move {
            if let Err(e) = runtime.stop_container(&owned).await {
                debug!("Service '{}' was not stopped: {}", service_name, e);
            }
            Ok(())
        });

        let default_port = options
            .ports
            .first()
            .copied()
            .unwrap_or(self.config.default_service_port);

        let proxies = options.proxy.then(|| ServiceProxies {
            service: name.to_string(),
            alias,
            default_port,
            listen_range: self.config.listen_port_range.clone(),
            manager: self.manager.clone(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        });

        Ok(ServiceHandle {
            name: name.to_string(),
            container,
            default_port,
            runtime: self.runtime.clone(),
            proxies,
        })
    }
}

/// Read-only view of a running service; its scope bucket owns the container
#[derive(Clone)]
pub struct ServiceHandle {
    pub name: String,
    pub container: ContainerHandle,
    default_port: u16,
    runtime: Arc<dyn ContainerRuntime>,
    proxies: Option<ServiceProxies>,
}

impl ServiceHandle {
    /// Externally reachable URL for the default port
    pub fn url(&self) -> HarnessResult<String> {
        self.url_for(self.default_port)
    }

    pub fn url_for(&self, port: u16) -> HarnessResult<String> {
        let mapped = self
            .container
            .mapped_port(port)
            .ok_or_else(|| HarnessError::PortNotExposed {
                service: self.name.clone(),
                port,
            })?;
        Ok(format!("http://{}:{}", self.container.host, mapped))
    }

    /// Proxied dial addresses; `None` unless the service was created with `proxy(true)`
    pub fn proxy(&self) -> Option<&ServiceProxies> {
        self.proxies.as_ref()
    }

    pub async fn exec(&self, command: &[String]) -> HarnessResult<ExecOutput> {
        self.runtime.exec(&self.container, command).await
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("container", &self.container)
            .field("proxied", &self.proxies.is_some())
            .finish()
    }
}

/// One lazily created proxy per upstream port of a service
#[derive(Clone)]
pub struct ServiceProxies {
    service: String,
    alias: String,
    default_port: u16,
    listen_range: Range<u16>,
    manager: NetworkFaultManager,
    cache: Arc<Mutex<HashMap<u16, String>>>,
}

impl ServiceProxies {
    /// Name of the rule fronting `upstream_port`
    pub fn proxy_name(&self, upstream_port: u16) -> String {
        format!("{}-proxy-{}", self.service, upstream_port)
    }

    /// Dial address of the proxy for the default port
    pub async fn addr(&self) -> HarnessResult<String> {
        self.addr_for(None, None).await
    }

    /// Dial address of the proxy fronting `upstream_port` (default port if
    /// `None`), creating the rule on first use.
    ///
    /// The cache lock is held while the rule is created, so concurrent calls
    /// for the same handle create it once. `listen_port` only matters on the
    /// first call for a port; otherwise one is picked from the configured range.
    ///
    /// The cached address does not survive a test boundary: after-each cleanup
    /// deletes the rule, so a suite-scoped handle returns a stale address in
    /// later tests.
    pub async fn addr_for(
        &self,
        upstream_port: Option<u16>,
        listen_port: Option<u16>,
    ) -> HarnessResult<String> {
        let upstream = upstream_port.unwrap_or(self.default_port);

        let mut cache = self.cache.lock().await;
        if let Some(addr) = cache.get(&upstream) {
            return Ok(addr.clone());
        }

        let listen = listen_port
            .unwrap_or_else(|| rand::thread_rng().gen_range(self.listen_range.clone()));

        let proxy = self
            .manager
            .create_proxy(&self.proxy_name(upstream), &self.alias, upstream, listen)
            .await?;

        let addr = proxy.dial_addr();
        cache.insert(upstream, addr.clone());
        Ok(addr)
    }
}
