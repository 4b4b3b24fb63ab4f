//! Toxiproxy Admin Client
//!
//! HTTP client for the Toxiproxy admin API running inside the admin container.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Response, StatusCode};
use url::Url;

use crate::error::{HarnessError, HarnessResult};
use crate::traits::ProxyAdmin;
use crate::types::{Proxy, Toxic};

#[derive(Clone, Debug)]
pub struct ToxiproxyClient {
    base_url: Url,
    client: reqwest::Client,
}

impl ToxiproxyClient {
    pub fn new(admin_url: &str) -> HarnessResult<Self> {
        let base_url = if admin_url.starts_with("http") {
            Url::parse(admin_url)?
        } else {
            Url::parse(&format!("http://{admin_url}"))?
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> HarnessResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> HarnessResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(HarnessError::AdminError {
            status: Some(status.as_u16()),
            message: admin_message(status, &body),
        })
    }

    /// Re-enable every proxy and drop every toxic
    async fn reset_toxics(&self) -> HarnessResult<()> {
        let url = self.endpoint(&["reset"])?;
        let response = self.client.post(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Prefer the `error` field of a JSON error body
fn admin_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[async_trait]
impl ProxyAdmin for ToxiproxyClient {
    async fn create_proxy(&self, proxy: &Proxy) -> HarnessResult<Proxy> {
        tracing::debug!(
            "🔌 Creating proxy '{}' {} -> {}",
            proxy.name,
            proxy.listen,
            proxy.upstream
        );

        let url = self.endpoint(&["proxies"])?;
        let response = self.client.post(url).json(proxy).send().await?;
        let created: Proxy = Self::check(response).await?.json().await?;
        Ok(created)
    }

    async fn list_proxies(&self) -> HarnessResult<BTreeMap<String, Proxy>> {
        let url = self.endpoint(&["proxies"])?;
        let response = self.client.get(url).send().await?;
        let proxies: BTreeMap<String, Proxy> = Self::check(response).await?.json().await?;
        Ok(proxies)
    }

    async fn remove_proxy(&self, name: &str) -> HarnessResult<()> {
        let url = self.endpoint(&["proxies", name])?;
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        tracing::debug!("🗑️ Removed proxy '{}'", name);
        Ok(())
    }

    async fn add_toxic(&self, proxy: &str, toxic: &Toxic) -> HarnessResult<Toxic> {
        tracing::debug!(
            "💉 Adding {} toxic '{}' to proxy '{}' ({})",
            toxic.kind,
            toxic.name,
            proxy,
            toxic.stream
        );

        let url = self.endpoint(&["proxies", proxy, "toxics"])?;
        let response = self.client.post(url).json(toxic).send().await?;
        let added: Toxic = Self::check(response).await?.json().await?;
        Ok(added)
    }

    async fn reset(&self) -> HarnessResult<()> {
        // POST /reset only clears toxics; rules are deleted one by one
        self.reset_toxics().await?;

        let proxies = self.list_proxies().await?;
        let removals = proxies.keys().map(|name| self.remove_proxy(name));
        for result in join_all(removals).await {
            match result {
                Ok(()) => {}
                // Already gone
                Err(HarnessError::AdminError {
                    status: Some(404), ..
                }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
