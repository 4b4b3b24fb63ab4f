//! Smoke scenario: a service started on the shared network answers from the host

use anyhow::{ensure, Result};
use chaosspec::{Harness, ServiceOptions};
use reqwest::StatusCode;

pub const ECHO_IMAGE: &str = "ealen/echo-server";

pub async fn run(harness: Harness) -> Result<()> {
    tracing::info!("🧪 Smoke: echo server reachable through its mapped port");

    let echo = harness
        .create_service("echo", ServiceOptions::new(ECHO_IMAGE).ports([80]))
        .await?;

    let url = echo.url()?;
    let response = reqwest::get(&url).await?;
    ensure!(
        response.status() == StatusCode::OK,
        "expected 200 from {}, got {}",
        url,
        response.status()
    );

    tracing::info!("✅ Smoke: PASSED");
    Ok(())
}
