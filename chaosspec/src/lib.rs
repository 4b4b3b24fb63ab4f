//! Fault-injection harness for container-backed integration tests
//!
//! This library runs services in containers on a shared network, fronts them
//! with Toxiproxy rules that tests can slow down, and tears everything down at
//! test and suite boundaries without the test author wiring any hooks.

pub mod config;
pub mod core;
pub mod error;
pub mod harness;
pub mod logging;
pub mod services;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{HarnessConfig, HarnessConfigBuilder, DEFAULT_AUTOWIRE_PATTERN};
pub use crate::core::{
    ArmState, CleanupRegistry, DrainReport, HookArmer, NetworkFaultManager, ProxyBinding,
    ProxyHandle, Scope, ServiceFactory, ServiceHandle, ServiceOptions, ServiceProxies,
};
pub use error::{HarnessError, HarnessResult};
pub use harness::{Harness, HarnessBuilder};
pub use services::{DockerCli, HookCounts, Standalone, Suite, ToxiproxyClient};
pub use traits::{ContainerRuntime, ProxyAdmin, TestFramework};
pub use types::{FrameworkContext, Hook, HookMode, Stream, Toxic};
