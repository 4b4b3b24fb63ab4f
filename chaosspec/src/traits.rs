//! Trait seams with mockall annotations for testing
//!
//! The container runtime, the proxy admin API and the host test framework are
//! external collaborators. Each sits behind one of these traits so the core
//! can be exercised with mocks or in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{HarnessError, HarnessResult};
use crate::types::{
    ContainerHandle, ContainerSpec, ExecOutput, FrameworkContext, Hook, NetworkHandle, Proxy,
    Toxic,
};

/// Container runtime abstraction
///
/// Every operation resolves only once the runtime has finished it; in
/// particular `start_container` returns once published ports are reachable.
#[mockall::automock]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create an isolated network containers can resolve each other on
    async fn create_network(&self, name: &str) -> HarnessResult<NetworkHandle>;

    async fn remove_network(&self, network: &NetworkHandle) -> HarnessResult<()>;

    async fn start_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerHandle>;

    async fn stop_container(&self, container: &ContainerHandle) -> HarnessResult<()>;

    /// Run a command inside a running container
    async fn exec(
        &self,
        container: &ContainerHandle,
        command: &[String],
    ) -> HarnessResult<ExecOutput>;
}

/// Fault-injection proxy admin API
///
/// The protocol can delete every rule at once (`reset`) but has no way to
/// clear the toxics of a single rule while keeping it. Implementations that
/// can do so advertise it through `supports_toxic_clear`.
#[mockall::automock]
#[async_trait]
pub trait ProxyAdmin: Send + Sync {
    /// Create a rule; the returned proxy carries the binds as stored by the admin
    async fn create_proxy(&self, proxy: &Proxy) -> HarnessResult<Proxy>;

    /// All rules keyed by name
    async fn list_proxies(&self) -> HarnessResult<BTreeMap<String, Proxy>>;

    async fn remove_proxy(&self, name: &str) -> HarnessResult<()>;

    async fn add_toxic(&self, proxy: &str, toxic: &Toxic) -> HarnessResult<Toxic>;

    /// Delete every proxy rule
    async fn reset(&self) -> HarnessResult<()>;

    fn supports_toxic_clear(&self) -> bool {
        false
    }

    /// Remove every toxic from one rule without touching its connections
    async fn clear_toxics(&self, proxy: &str) -> HarnessResult<()> {
        Err(HarnessError::Unsupported {
            operation: format!("clear toxics on {proxy}"),
        })
    }
}

/// Host test framework abstraction
///
/// Reports where the current call originates and accepts boundary callbacks.
/// Installing a callback while a test body is running is not allowed by most
/// frameworks, which is why callers check `context` first.
#[mockall::automock]
pub trait TestFramework: Send + Sync {
    fn context(&self) -> FrameworkContext;

    /// Run once before the first test
    fn before_all(&self, hook: Hook);

    /// Run after every test, whatever its outcome
    fn after_each(&self, hook: Hook);

    /// Run once after the last test
    fn after_all(&self, hook: Hook);
}
