//! Docker-backed scenario runner
//!
//! Drives the harness against a real container runtime. Each scenario runs
//! as a one-test suite so the same lifecycle hooks fire as in a chaos test
//! file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tester::TestScenarios;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let scenarios = TestScenarios::from_env()?;
//! scenarios.run_scenario("latency").await?;
//! # Ok(())
//! # }
//! ```

pub mod scenarios;

pub use scenarios::TestScenarios;
