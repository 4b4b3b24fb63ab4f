//! Latency scenario
//!
//! A probe container on the shared network times requests through the echo
//! service's proxy while the host times the direct path.

use std::time::{Duration, Instant};

use anyhow::{anyhow, ensure, Context, Result};
use chaosspec::{Harness, ServiceHandle, ServiceOptions, Stream};
use reqwest::StatusCode;

use super::smoke::ECHO_IMAGE;

pub const PROBE_IMAGE: &str = "curlimages/curl";
pub const INJECTED_LATENCY_MS: u64 = 500;

pub async fn run(harness: Harness) -> Result<()> {
    tracing::info!("🧪 Latency: {}ms through the proxy only", INJECTED_LATENCY_MS);

    let echo = harness
        .create_service(
            "echo",
            ServiceOptions::new(ECHO_IMAGE).ports([80]).proxy(true),
        )
        .await?;
    let probe = harness
        .create_service(
            "probe",
            ServiceOptions::new(PROBE_IMAGE).command(["sleep", "3600"]),
        )
        .await?;

    let proxies = echo
        .proxy()
        .ok_or_else(|| anyhow!("echo service was created without a proxy"))?;
    let proxied_url = format!("http://{}/", proxies.addr().await?);
    let proxy_name = proxies.proxy_name(80);
    let threshold = Duration::from_millis(INJECTED_LATENCY_MS);

    let baseline = timed_probe(&probe, &proxied_url).await?;
    tracing::info!("Baseline through proxy: {:?}", baseline);

    harness
        .inject_latency(&proxy_name, INJECTED_LATENCY_MS, 0, Stream::Downstream)
        .await?;

    let slowed = timed_probe(&probe, &proxied_url).await?;
    ensure!(
        slowed >= threshold,
        "proxied request took {:?}, expected at least {:?}",
        slowed,
        threshold
    );

    let direct = timed_direct(&echo.url()?).await?;
    ensure!(
        direct < threshold,
        "direct request took {:?}; latency leaked past the proxy",
        direct
    );

    harness.remove_all_toxics(&proxy_name).await?;
    let recovered = timed_probe(&probe, &proxied_url).await?;
    ensure!(
        recovered < threshold,
        "proxied request still took {:?} after clearing toxics",
        recovered
    );

    tracing::info!(
        "✅ Latency: PASSED (baseline {:?}, slowed {:?}, direct {:?})",
        baseline,
        slowed,
        direct
    );
    Ok(())
}

/// curl invocation printing only the total request time in seconds
pub fn curl_timing_command(url: &str) -> Vec<String> {
    ["curl", "-s", "-o", "/dev/null", "-w", "%{time_total}", url]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
}

pub fn parse_curl_seconds(stdout: &str) -> Result<Duration> {
    let seconds: f64 = stdout
        .trim()
        .parse()
        .with_context(|| format!("unexpected curl output {stdout:?}"))?;
    ensure!(seconds >= 0.0, "negative curl timing {}", seconds);
    Ok(Duration::from_secs_f64(seconds))
}

async fn timed_probe(probe: &ServiceHandle, url: &str) -> Result<Duration> {
    let output = probe.exec(&curl_timing_command(url)).await?;
    ensure!(
        output.success(),
        "curl exited with {}: {}",
        output.exit_code,
        output.stderr.trim()
    );
    parse_curl_seconds(&output.stdout)
}

async fn timed_direct(url: &str) -> Result<Duration> {
    let start = Instant::now();
    let response = reqwest::get(url).await?;
    ensure!(
        response.status() == StatusCode::OK,
        "expected 200 from {}, got {}",
        url,
        response.status()
    );
    Ok(start.elapsed())
}
