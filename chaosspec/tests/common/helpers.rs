//! Stateful fakes and harness wiring for integration tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chaosspec::core::AdminConnector;
use chaosspec::types::{ContainerHandle, ContainerSpec, ExecOutput, NetworkHandle, Proxy};
use chaosspec::{
    ContainerRuntime, Harness, HarnessConfig, HarnessError, HarnessResult, ProxyAdmin,
    TestFramework, Toxic,
};

use super::fixtures::TestFixtures;

#[derive(Default)]
struct RuntimeState {
    networks: HashMap<String, String>,
    networks_created: usize,
    running: HashMap<String, ContainerSpec>,
    started: Vec<ContainerSpec>,
    next_id: usize,
    next_port: u16,
    fail_stops: bool,
}

/// Container runtime that only keeps bookkeeping
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `stop_container` call fail
    pub fn fail_stops(&self) {
        self.state.lock().unwrap().fail_stops = true;
    }

    pub fn networks_created(&self) -> usize {
        self.state.lock().unwrap().networks_created
    }

    pub fn active_networks(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.values().cloned().collect()
    }

    /// Images of the containers still running, sorted
    pub fn running_images(&self) -> Vec<String> {
        let mut images: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .running
            .values()
            .map(|spec| spec.image.clone())
            .collect();
        images.sort();
        images
    }

    /// Every spec ever started, in start order
    pub fn started(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().started.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_network(&self, name: &str) -> HarnessResult<NetworkHandle> {
        let mut state = self.state.lock().unwrap();
        state.networks_created += 1;
        let id = format!("net-{}", state.networks_created);
        state.networks.insert(id.clone(), name.to_string());
        Ok(NetworkHandle {
            id,
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, network: &NetworkHandle) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.networks.remove(&network.id) {
            Some(_) => Ok(()),
            None => Err(HarnessError::runtime(
                format!("docker network rm {}", network.id),
                "no such network",
            )),
        }
    }

    async fn start_container(&self, spec: &ContainerSpec) -> HarnessResult<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("container-{}", state.next_id);

        let mut mapped_ports = HashMap::new();
        for &port in &spec.exposed_ports {
            mapped_ports.insert(port, TestFixtures::FIRST_HOST_PORT + state.next_port);
            state.next_port += 1;
        }

        state.running.insert(id.clone(), spec.clone());
        state.started.push(spec.clone());

        Ok(ContainerHandle {
            id,
            host: "localhost".to_string(),
            mapped_ports,
        })
    }

    async fn stop_container(&self, container: &ContainerHandle) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stops {
            return Err(HarnessError::runtime("docker stop", "daemon unavailable"));
        }
        match state.running.remove(&container.id) {
            Some(_) => Ok(()),
            None => Err(HarnessError::runtime(
                format!("docker stop {}", container.id),
                "no such container",
            )),
        }
    }

    async fn exec(
        &self,
        container: &ContainerHandle,
        command: &[String],
    ) -> HarnessResult<ExecOutput> {
        let running = self.state.lock().unwrap().running.contains_key(&container.id);
        Ok(ExecOutput {
            exit_code: if running { 0 } else { 1 },
            stdout: command.join(" "),
            stderr: String::new(),
        })
    }
}

#[derive(Default)]
struct AdminState {
    proxies: BTreeMap<String, Proxy>,
    creations: usize,
}

/// In-memory Toxiproxy. Stores `0.0.0.0` listen binds as `[::]` like the
/// real service does.
#[derive(Default)]
pub struct FakeToxiproxy {
    state: Mutex<AdminState>,
}

impl FakeToxiproxy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connector(fake: &Arc<Self>) -> AdminConnector {
        let admin: Arc<dyn ProxyAdmin> = fake.clone();
        Arc::new(move |_url: &str| -> HarnessResult<Arc<dyn ProxyAdmin>> {
            Ok(admin.clone())
        })
    }

    /// Number of successful `create_proxy` calls
    pub fn creations(&self) -> usize {
        self.state.lock().unwrap().creations
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().proxies.keys().cloned().collect()
    }

    pub fn proxy(&self, name: &str) -> Option<Proxy> {
        self.state.lock().unwrap().proxies.get(name).cloned()
    }

    fn not_found(name: &str) -> HarnessError {
        HarnessError::AdminError {
            status: Some(404),
            message: format!("proxy {name} not found"),
        }
    }
}

#[async_trait]
impl ProxyAdmin for FakeToxiproxy {
    async fn create_proxy(&self, proxy: &Proxy) -> HarnessResult<Proxy> {
        let mut state = self.state.lock().unwrap();
        if state.proxies.contains_key(&proxy.name) {
            return Err(HarnessError::AdminError {
                status: Some(409),
                message: "proxy already exists".to_string(),
            });
        }

        let mut stored = proxy.clone();
        stored.listen = proxy.listen.replace("0.0.0.0:", "[::]:");
        stored.toxics.clear();

        state.creations += 1;
        state.proxies.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn list_proxies(&self) -> HarnessResult<BTreeMap<String, Proxy>> {
        Ok(self.state.lock().unwrap().proxies.clone())
    }

    async fn remove_proxy(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .proxies
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn add_toxic(&self, proxy: &str, toxic: &Toxic) -> HarnessResult<Toxic> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .proxies
            .get_mut(proxy)
            .ok_or_else(|| Self::not_found(proxy))?;
        stored.toxics.push(toxic.clone());
        Ok(toxic.clone())
    }

    async fn reset(&self) -> HarnessResult<()> {
        self.state.lock().unwrap().proxies.clear();
        Ok(())
    }
}

/// A harness wired to fresh fakes
pub struct TestBed {
    pub harness: Harness,
    pub runtime: Arc<FakeRuntime>,
    pub admin: Arc<FakeToxiproxy>,
}

impl TestBed {
    /// No test framework; the caller drives every boundary
    pub fn standalone() -> Self {
        Self::build(None)
    }

    pub fn with_framework(framework: Arc<dyn TestFramework>) -> Self {
        Self::build(Some(framework))
    }

    fn build(framework: Option<Arc<dyn TestFramework>>) -> Self {
        let runtime = FakeRuntime::new();
        let admin = FakeToxiproxy::new();

        let config = HarnessConfig::builder()
            .startup_timeout(Duration::from_secs(1))
            .build()
            .unwrap();

        let mut builder = Harness::builder()
            .config(config)
            .runtime(runtime.clone())
            .connector(FakeToxiproxy::connector(&admin));
        if let Some(framework) = framework {
            builder = builder.framework(framework);
        }

        Self {
            harness: builder.build().unwrap(),
            runtime,
            admin,
        }
    }

    /// Standalone bed with the fault infrastructure already running
    pub async fn started() -> Self {
        let bed = Self::standalone();
        bed.harness.start().await.unwrap();
        bed
    }
}
