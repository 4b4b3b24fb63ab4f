//! Service implementations
//!
//! Real implementations of the trait seams: the Docker CLI runtime, the
//! Toxiproxy HTTP client and the test framework adapters.

pub mod docker;
pub mod suite;
pub mod toxiproxy;

pub use docker::DockerCli;
pub use suite::{HookCounts, Standalone, Suite};
pub use toxiproxy::ToxiproxyClient;
