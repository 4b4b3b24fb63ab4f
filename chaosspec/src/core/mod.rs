//! Core harness components
//!
//! Lifecycle state and fault-injection logic. All I/O goes through the trait
//! seams in `crate::traits`, so everything here runs against mocks.

pub mod factory;
pub mod hooks;
pub mod injection;
pub mod manager;
pub mod registry;

pub use factory::{ServiceFactory, ServiceHandle, ServiceOptions, ServiceProxies};
pub use hooks::{ArmState, HookArmer};
pub use injection::{inject_latency, remove_all_toxics};
pub use manager::{AdminConnector, NetworkFaultManager, ProxyBinding, ProxyHandle};
pub use registry::{CleanupAction, CleanupRegistry, DrainReport, Scope};
