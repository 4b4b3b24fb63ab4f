//! Network Fault Manager
//!
//! Owns the shared virtual network, the Toxiproxy admin container and the
//! admin client. The three exist together or not at all. Proxy rules are
//! created and recreated only through this manager so their binds stay
//! tracked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::core::registry::{CleanupRegistry, Scope};
use crate::error::{HarnessError, HarnessResult};
use crate::traits::{ContainerRuntime, ProxyAdmin};
use crate::types::{ContainerHandle, ContainerSpec, NetworkHandle, Proxy, Stream, Toxic};

/// Builds an admin client from the admin container's external URL
pub type AdminConnector = Arc<dyn Fn(&str) -> HarnessResult<Arc<dyn ProxyAdmin>> + Send + Sync>;

/// Listen and upstream binds of a rule, kept so it can be recreated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    pub listen: String,
    pub upstream: String,
}

struct Infra {
    network: NetworkHandle,
    container: ContainerHandle,
    client: Arc<dyn ProxyAdmin>,
}

struct ManagerInner {
    config: HarnessConfig,
    runtime: Arc<dyn ContainerRuntime>,
    connector: AdminConnector,
    registry: CleanupRegistry,
    infra: AsyncMutex<Option<Infra>>,
    bindings: Mutex<HashMap<String, ProxyBinding>>,
}

#[derive(Clone)]
pub struct NetworkFaultManager {
    inner: Arc<ManagerInner>,
}

impl NetworkFaultManager {
    pub fn new(
        config: HarnessConfig,
        runtime: Arc<dyn ContainerRuntime>,
        connector: AdminConnector,
        registry: CleanupRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                runtime,
                connector,
                registry,
                infra: AsyncMutex::new(None),
                bindings: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Network alias other containers use to reach the admin service
    pub fn alias(&self) -> &str {
        &self.inner.config.admin_alias
    }

    pub async fn is_started(&self) -> bool {
        self.inner.infra.lock().await.is_some()
    }

    /// Provision the network, admin container and client. No-op if started.
    ///
    /// Concurrent callers wait on the same lock, so only the first one
    /// provisions. On failure, whatever was already created is torn down.
    pub async fn start(&self) -> HarnessResult<()> {
        let mut infra = self.inner.infra.lock().await;
        if infra.is_some() {
            return Ok(());
        }

        let config = &self.inner.config;
        let runtime = &self.inner.runtime;

        let network_name = format!("{}-{}", config.network_prefix, Uuid::new_v4().simple());
        let network = runtime.create_network(&network_name).await?;

        let mut spec = ContainerSpec::new(config.admin_image.clone());
        spec.exposed_ports = vec![config.admin_port];
        spec.network = Some(network.name.clone());
        spec.aliases = vec![config.admin_alias.clone()];

        let container = match runtime.start_container(&spec).await {
            Ok(container) => container,
            Err(e) => {
                self.discard_network(&network).await;
                return Err(e);
            }
        };

        let client = match self.connect(&container).await {
            Ok(client) => client,
            Err(e) => {
                if let Err(stop_err) = runtime.stop_container(&container).await {
                    warn!("⚠️ Failed to stop admin container after failed start: {}", stop_err);
                }
                self.discard_network(&network).await;
                return Err(e);
            }
        };

        info!(
            "🧪 Fault infrastructure ready on network {} (admin alias '{}')",
            network.name, config.admin_alias
        );

        *infra = Some(Infra {
            network,
            container,
            client,
        });
        drop(infra);

        let manager = self.clone();
        self.inner.registry.register_in(Scope::Suite, move || async move {
            manager.stop().await?;
            Ok(())
        });

        Ok(())
    }

    async fn connect(&self, container: &ContainerHandle) -> HarnessResult<Arc<dyn ProxyAdmin>> {
        let config = &self.inner.config;
        let admin_port = container
            .mapped_port(config.admin_port)
            .ok_or_else(|| HarnessError::PortNotExposed {
                service: config.admin_alias.clone(),
                port: config.admin_port,
            })?;

        let client = (self.inner.connector)(&config.admin_url(admin_port))?;

        // The port can be published before the API answers
        let start = Instant::now();
        loop {
            match client.list_proxies().await {
                Ok(_) => return Ok(client),
                Err(e) if start.elapsed() >= config.startup_timeout => return Err(e),
                Err(e) => {
                    debug!("⏳ Waiting for proxy admin API: {}", e);
                    sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }

    async fn discard_network(&self, network: &NetworkHandle) {
        if let Err(e) = self.inner.runtime.remove_network(network).await {
            warn!("⚠️ Failed to remove network {} after failed start: {}", network.name, e);
        }
    }

    pub async fn network(&self) -> HarnessResult<NetworkHandle> {
        let infra = self.inner.infra.lock().await;
        infra
            .as_ref()
            .map(|infra| infra.network.clone())
            .ok_or_else(|| HarnessError::not_started("Toxiproxy network"))
    }

    pub async fn client(&self) -> HarnessResult<Arc<dyn ProxyAdmin>> {
        let infra = self.inner.infra.lock().await;
        infra
            .as_ref()
            .map(|infra| infra.client.clone())
            .ok_or_else(|| HarnessError::not_started("Toxiproxy client"))
    }

    /// Create a rule listening on `<alias>:<listen_port>` inside the shared
    /// network and forwarding to `upstream_host:upstream_port`.
    ///
    /// The rule is removed when the test bucket is drained.
    pub async fn create_proxy(
        &self,
        name: &str,
        upstream_host: &str,
        upstream_port: u16,
        listen_port: u16,
    ) -> HarnessResult<ProxyHandle> {
        let client = self.client().await?;

        let requested = Proxy::new(
            name,
            format!("0.0.0.0:{listen_port}"),
            format!("{upstream_host}:{upstream_port}"),
        );
        let created = client.create_proxy(&requested).await?;

        let binding = ProxyBinding {
            listen: created.listen,
            upstream: created.upstream,
        };
        self.track(name, binding.clone());

        info!(
            "🔌 Proxy '{}' {} -> {} (dial {}:{})",
            name,
            binding.listen,
            binding.upstream,
            self.alias(),
            listen_port
        );

        let manager = self.clone();
        let proxy_name = name.to_string();
        self.inner.registry.register(move || async move {
            manager.remove_proxy_quietly(&proxy_name).await;
            Ok(())
        });

        Ok(ProxyHandle {
            name: name.to_string(),
            listen_host: self.alias().to_string(),
            listen_port,
            binding,
            manager: self.clone(),
        })
    }

    /// Binds recorded for a rule created through this manager
    pub fn binding(&self, name: &str) -> Option<ProxyBinding> {
        let bindings = self.inner.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        bindings.get(name).cloned()
    }

    fn track(&self, name: &str, binding: ProxyBinding) {
        let mut bindings = self.inner.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        bindings.insert(name.to_string(), binding);
    }

    fn untrack(&self, name: &str) {
        let mut bindings = self.inner.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        bindings.remove(name);
    }

    fn untrack_all(&self) {
        let mut bindings = self.inner.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        bindings.clear();
    }

    /// Best-effort removal of one rule
    pub async fn remove_proxy_quietly(&self, name: &str) {
        self.untrack(name);

        let client = match self.client().await {
            Ok(client) => client,
            Err(_) => return,
        };

        if let Err(e) = client.remove_proxy(name).await {
            debug!("Proxy '{}' was not removed: {}", name, e);
        }
    }

    pub async fn add_latency(
        &self,
        name: &str,
        latency_ms: u64,
        jitter_ms: u64,
        stream: Stream,
    ) -> HarnessResult<()> {
        let client = self.client().await?;
        let toxic = Toxic::latency(latency_ms, jitter_ms, stream);
        client.add_toxic(name, &toxic).await?;
        info!(
            "🐢 Added {}ms (±{}ms) {} latency to proxy '{}'",
            latency_ms, jitter_ms, stream, name
        );
        Ok(())
    }

    /// Clear every toxic on a rule.
    ///
    /// Unless the admin supports clearing toxics in place, the rule is
    /// deleted and recreated with the same binds. Connections passing
    /// through it at that moment are dropped.
    pub async fn recreate_proxy(&self, name: &str, binding: &ProxyBinding) -> HarnessResult<()> {
        let client = self.client().await?;

        if client.supports_toxic_clear() {
            return client.clear_toxics(name).await;
        }

        if let Err(e) = client.remove_proxy(name).await {
            debug!("Proxy '{}' was not removed before recreation: {}", name, e);
        }

        let recreated = client
            .create_proxy(&Proxy::new(name, binding.listen.clone(), binding.upstream.clone()))
            .await?;

        self.track(
            name,
            ProxyBinding {
                listen: recreated.listen,
                upstream: recreated.upstream,
            },
        );

        warn!(
            "♻️ Recreated proxy '{}' to clear its toxics; open connections through it were dropped",
            name
        );
        Ok(())
    }

    /// Delete every proxy rule. No-op when not started.
    pub async fn reset(&self) -> HarnessResult<()> {
        let client = match self.client().await {
            Ok(client) => client,
            Err(_) => return Ok(()),
        };

        client.reset().await?;
        self.untrack_all();
        debug!("🧹 Removed all proxies");
        Ok(())
    }

    /// Reset proxies, then remove the admin container and the network.
    ///
    /// Idempotent. Handles are cleared before teardown so a later `start`
    /// always reprovisions; the first teardown failure is returned.
    pub async fn stop(&self) -> HarnessResult<()> {
        let mut guard = self.inner.infra.lock().await;
        let infra = match guard.take() {
            Some(infra) => infra,
            None => return Ok(()),
        };

        let mut first_error = None;

        if let Err(e) = infra.client.reset().await {
            warn!("⚠️ Failed to reset proxies during stop: {}", e);
            first_error = first_error.or(Some(e));
        }
        self.untrack_all();

        if let Err(e) = self.inner.runtime.stop_container(&infra.container).await {
            warn!("⚠️ Failed to stop admin container: {}", e);
            first_error = first_error.or(Some(e));
        }

        if let Err(e) = self.inner.runtime.remove_network(&infra.network).await {
            warn!("⚠️ Failed to remove network {}: {}", infra.network.name, e);
            first_error = first_error.or(Some(e));
        }

        drop(guard);
        info!("🛑 Fault infrastructure stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for NetworkFaultManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkFaultManager")
            .field("alias", &self.inner.config.admin_alias)
            .finish()
    }
}

/// A proxy rule created through the manager
#[derive(Clone)]
pub struct ProxyHandle {
    pub name: String,
    /// Admin service alias on the shared network
    pub listen_host: String,
    pub listen_port: u16,
    binding: ProxyBinding,
    manager: NetworkFaultManager,
}

impl ProxyHandle {
    /// Address other containers on the shared network dial instead of the real service
    pub fn dial_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn listen(&self) -> &str {
        &self.binding.listen
    }

    pub fn upstream(&self) -> &str {
        &self.binding.upstream
    }

    pub async fn add_latency(
        &self,
        latency_ms: u64,
        jitter_ms: u64,
        stream: Stream,
    ) -> HarnessResult<()> {
        self.manager
            .add_latency(&self.name, latency_ms, jitter_ms, stream)
            .await
    }

    /// Clear every toxic by recreating the rule; open connections through it are dropped
    pub async fn remove_all_toxics(&self) -> HarnessResult<()> {
        self.manager.recreate_proxy(&self.name, &self.binding).await
    }

    pub async fn delete(&self) {
        self.manager.remove_proxy_quietly(&self.name).await;
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("name", &self.name)
            .field("dial_addr", &self.dial_addr())
            .field("listen", &self.binding.listen)
            .field("upstream", &self.binding.upstream)
            .finish()
    }
}
