//! Scenario Runner
//!
//! Runs harness scenarios against the local Docker daemon:
//! - Starts services and the Toxiproxy admin on a throwaway network
//! - Injects faults and checks what the services observe
//! - Tears everything down through the harness's own lifecycle hooks

use clap::Parser;
use std::time::Duration;
use tokio::time::timeout;

use chaosspec::logging::init_tracing;
use tester::TestScenarios;

#[derive(Parser)]
#[command(name = "tester")]
#[command(about = "Docker-backed scenarios for the chaosspec harness")]
struct Args {
    /// Scenario to run (smoke, latency, all)
    #[arg(long, default_value = "all")]
    scenario: String,

    /// Scenario timeout in seconds
    #[arg(long, default_value = "180")]
    timeout_secs: u64,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    tracing::info!("🧪 Starting scenario runner");
    tracing::info!("Scenario: {}, Timeout: {}s", args.scenario, args.timeout_secs);

    let scenarios = TestScenarios::from_env()?;

    let result = timeout(
        Duration::from_secs(args.timeout_secs),
        scenarios.run_scenario(&args.scenario),
    )
    .await;

    match result {
        Ok(Ok(())) => {
            tracing::info!("✅ Scenario '{}' completed successfully", args.scenario);
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("❌ Scenario '{}' failed: {:#}", args.scenario, e);
            Err(e)
        }
        Err(_) => {
            // Provisioning already in flight is not cancelled
            tracing::error!(
                "⏰ Scenario '{}' timed out after {}s",
                args.scenario,
                args.timeout_secs
            );
            Err(anyhow::anyhow!("scenario timed out"))
        }
    }
}
