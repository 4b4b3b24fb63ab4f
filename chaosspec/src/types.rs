//! Data types shared by the harness components and their trait seams

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HarnessResult;

/// Direction of traffic a toxic applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Service -> client
    #[default]
    Downstream,
    /// Client -> service
    Upstream,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Downstream => write!(f, "downstream"),
            Stream::Upstream => write!(f, "upstream"),
        }
    }
}

/// A fault attached to a proxy rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toxic {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub stream: Stream,
    /// Probability in [0, 1] that the toxic applies to a connection
    pub toxicity: f32,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl Toxic {
    /// Latency toxic that always triggers, with a name unique to this call
    pub fn latency(latency_ms: u64, jitter_ms: u64, stream: Stream) -> Self {
        Self {
            name: format!("latency-{}", Uuid::new_v4().simple()),
            kind: "latency".to_string(),
            stream,
            toxicity: 1.0,
            attributes: serde_json::json!({
                "latency": latency_ms,
                "jitter": jitter_ms,
            }),
        }
    }
}

/// A proxy rule as seen by the admin service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    pub name: String,
    pub listen: String,
    pub upstream: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing)]
    pub toxics: Vec<Toxic>,
}

fn enabled_by_default() -> bool {
    true
}

impl Proxy {
    pub fn new<N: Into<String>, L: Into<String>, U: Into<String>>(
        name: N,
        listen: L,
        upstream: U,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            upstream: upstream.into(),
            enabled: true,
            toxics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

/// What to run and how to attach it to the shared network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub exposed_ports: Vec<u16>,
    pub environment: HashMap<String, String>,
    pub network: Option<String>,
    pub aliases: Vec<String>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn new<S: Into<String>>(image: S) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
}

/// A running container and its published ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub host: String,
    /// container port -> host port
    pub mapped_ports: HashMap<u16, u16>,
}

impl ContainerHandle {
    pub fn mapped_port(&self, port: u16) -> Option<u16> {
        self.mapped_ports.get(&port).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Where a harness entry point was called from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkContext {
    /// No test framework is driving this process
    Absent,
    /// File or suite scope, before any test body runs
    OuterScope { test_file: Option<String> },
    /// Inside a running test body
    InsideTest {
        test_name: String,
        test_file: Option<String>,
    },
}

impl FrameworkContext {
    pub fn test_file(&self) -> Option<&str> {
        match self {
            FrameworkContext::Absent => None,
            FrameworkContext::OuterScope { test_file } => test_file.as_deref(),
            FrameworkContext::InsideTest { test_file, .. } => test_file.as_deref(),
        }
    }
}

/// How lifecycle boundaries are being satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// The caller acts as its own boundary
    Inline,
    /// Boundary callbacks are installed in the test framework
    Hooks,
}

/// Boundary callback handed to a test framework
pub type Hook = Arc<dyn Fn() -> BoxFuture<'static, HarnessResult<()>> + Send + Sync>;
