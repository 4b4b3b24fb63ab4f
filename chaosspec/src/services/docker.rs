//! Docker CLI container runtime
//!
//! Drives the `docker` binary through `tokio::process::Command`. Containers
//! are started detached with `--rm`, so stopping one also removes it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::traits::ContainerRuntime;
use crate::types::{ContainerHandle, ContainerSpec, ExecOutput, NetworkHandle};

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    host: String,
    startup_timeout: Duration,
    stop_timeout: Duration,
}

impl DockerCli {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            binary: config.docker_binary.clone(),
            host: config.docker_host.clone(),
            startup_timeout: config.startup_timeout,
            stop_timeout: config.stop_timeout,
        }
    }

    /// Run a docker subcommand and return its trimmed stdout
    async fn docker(&self, args: &[String]) -> HarnessResult<String> {
        let command_line = format!("{} {}", self.binary, args.join(" "));
        debug!("🐳 {}", command_line);

        let output = Command::new(&self.binary).args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(HarnessError::runtime(command_line, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn resolve_mapped_port(&self, container_id: &str, port: u16) -> HarnessResult<u16> {
        let output = self
            .docker(&[
                "port".to_string(),
                container_id.to_string(),
                format!("{port}/tcp"),
            ])
            .await?;

        parse_port_mapping(&output).ok_or_else(|| {
            HarnessError::runtime(
                format!("{} port {} {}/tcp", self.binary, container_id, port),
                format!("unexpected output: {output:?}"),
            )
        })
    }

    /// Resolve host mappings for `ports` and wait until each one is reachable
    async fn publish_ports(
        &self,
        mut container: ContainerHandle,
        ports: &[u16],
    ) -> HarnessResult<ContainerHandle> {
        for &port in ports {
            let host_port = self.resolve_mapped_port(&container.id, port).await?;
            container.mapped_ports.insert(port, host_port);
        }

        for &host_port in container.mapped_ports.values() {
            self.wait_for_port(host_port).await?;
        }

        Ok(container)
    }

    /// Wait until a published port accepts TCP connections
    async fn wait_for_port(&self, host_port: u16) -> HarnessResult<()> {
        let start = Instant::now();

        while start.elapsed() < self.startup_timeout {
            if TcpStream::connect((self.host.as_str(), host_port)).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(250)).await;
        }

        Err(HarnessError::runtime(
            format!("connect {}:{}", self.host, host_port),
            format!("port not reachable within {:?}", self.startup_timeout),
        ))
    }
}

/// Build the `docker run` arguments for a spec
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string(), "--rm".to_string()];

    if let Some(ref network) = spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }

    for alias in &spec.aliases {
        args.push("--network-alias".to_string());
        args.push(alias.clone());
    }

    let mut environment: Vec<_> = spec.environment.iter().collect();
    environment.sort();
    for (key, value) in environment {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    for port in &spec.exposed_ports {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// Host port from `docker port` output such as `0.0.0.0:49153\n[::]:49153`
pub fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse::<u16>().ok())
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create_network(&self, name: &str) -> HarnessResult<NetworkHandle> {
        let id = self
            .docker(&["network".to_string(), "create".to_string(), name.to_string()])
            .await?;
        info!("🌐 Created network {}", name);
        Ok(NetworkHandle {
            id,
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, network: &NetworkHandle) -> HarnessResult<()> {
        self.docker(&["network".to_string(), "rm".to_string(), network.id.clone()])
            .await?;
        info!("🌐 Removed network {}", network.name);
        Ok(())
    }

    async fn start_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerHandle> {
        let id = self.docker(&run_args(spec)).await?;
        info!("🚀 Started container {} ({})", spec.image, short_id(&id));

        let container = ContainerHandle {
            id,
            host: self.host.clone(),
            mapped_ports: HashMap::new(),
        };

        match self.publish_ports(container.clone(), &spec.exposed_ports).await {
            Ok(ready) => Ok(ready),
            Err(e) => {
                if let Err(stop_err) = self.stop_container(&container).await {
                    warn!(
                        "⚠️ Failed to stop container {} after failed start: {}",
                        short_id(&container.id),
                        stop_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn stop_container(&self, container: &ContainerHandle) -> HarnessResult<()> {
        self.docker(&[
            "stop".to_string(),
            "-t".to_string(),
            self.stop_timeout.as_secs().to_string(),
            container.id.clone(),
        ])
        .await?;
        info!("🛑 Stopped container {}", short_id(&container.id));
        Ok(())
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        command: &[String],
    ) -> HarnessResult<ExecOutput> {
        let output = Command::new(&self.binary)
            .arg("exec")
            .arg(&container.id)
            .args(command)
            .output()
            .await?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
