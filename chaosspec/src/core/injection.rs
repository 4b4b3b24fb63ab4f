//! Fault helpers addressing an existing proxy by name

use tracing::debug;

use crate::core::manager::{NetworkFaultManager, ProxyBinding};
use crate::error::{HarnessError, HarnessResult};
use crate::types::{Stream, Toxic};

/// Add a latency toxic to the named proxy.
///
/// Fails with `ProxyNotFound`, listing the proxies that do exist, when the
/// name is unknown to the admin service.
pub async fn inject_latency(
    manager: &NetworkFaultManager,
    proxy_name: &str,
    latency_ms: u64,
    jitter_ms: u64,
    stream: Stream,
) -> HarnessResult<()> {
    let client = manager.client().await?;
    let proxies = client.list_proxies().await?;

    if !proxies.contains_key(proxy_name) {
        return Err(HarnessError::ProxyNotFound {
            name: proxy_name.to_string(),
            available: proxies.keys().cloned().collect(),
        });
    }

    client
        .add_toxic(proxy_name, &Toxic::latency(latency_ms, jitter_ms, stream))
        .await?;
    debug!("🐢 Injected {}ms latency into '{}'", latency_ms, proxy_name);
    Ok(())
}

/// Clear every toxic on the named proxy by recreating it with the same binds.
///
/// No-op when the proxy does not exist. Connections through the proxy are
/// dropped.
pub async fn remove_all_toxics(manager: &NetworkFaultManager, proxy_name: &str) -> HarnessResult<()> {
    let client = manager.client().await?;
    let proxies = client.list_proxies().await?;

    let Some(proxy) = proxies.get(proxy_name) else {
        debug!("Proxy '{}' does not exist; nothing to clear", proxy_name);
        return Ok(());
    };

    let binding = ProxyBinding {
        listen: proxy.listen.clone(),
        upstream: proxy.upstream.clone(),
    };
    manager.recreate_proxy(proxy_name, &binding).await
}
