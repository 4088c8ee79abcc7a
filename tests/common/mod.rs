//! Shared fixtures for integration tests: a recording in-memory container
//! runtime and helpers to build networks.

#![allow(dead_code)]

use async_trait::async_trait;
use besunet::config::{BesuNodeConfig, NetworkConfig, NodeType, OrchestratorSettings};
use besunet::docker::{
    ContainerInspection, ContainerRuntime, ContainerSpec, DockerNetworkSummary, NetworkSpec, PortBindingInfo,
    RuntimeError,
};
use besunet::orchestrator::NetworkManager;
use besunet::store::{FsStore, MemoryStore};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const COINBASE: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<String>,
    networks: Vec<DockerNetworkSummary>,
    network_specs: Vec<NetworkSpec>,
    containers: BTreeMap<String, FakeContainer>,
    images: HashSet<String>,
    failing: HashSet<String>,
    next_id: u64,
}

/// In-memory Docker daemon that records every call.
///
/// Operations named through [`FakeRuntime::fail`] answer with a 500.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Record `op` and return the injected failure, if any
    fn enter(&self, op: &str) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.calls.push(op.to_string());
        if state.failing.contains(op) {
            return Err(RuntimeError::Daemon {
                status: 500,
                message: format!("injected failure in {}", op),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{}{:04}", prefix, state.next_id)
    }

    pub fn fail(&self, op: &str) {
        self.state().failing.insert(op.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == op).count()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state().containers.values().cloned().collect()
    }

    pub fn container_named(&self, name: &str) -> Option<FakeContainer> {
        self.state().containers.values().find(|c| c.spec.name == name).cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.state().networks.iter().map(|n| n.name.clone()).collect()
    }

    pub fn network_specs(&self) -> Vec<NetworkSpec> {
        self.state().network_specs.clone()
    }

    /// Simulate a network created outside the orchestrator
    pub fn add_foreign_network(&self, name: &str) -> String {
        let id = self.next_id("net");
        self.state().networks.push(DockerNetworkSummary {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    /// Simulate a container removed behind the orchestrator's back
    pub fn forget_container(&self, container_id: &str) {
        self.state().containers.remove(container_id);
    }
}

fn not_found(resource: &str) -> RuntimeError {
    RuntimeError::NotFound {
        resource: resource.to_string(),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.enter("ping")
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        self.enter("create_network")?;
        let id = self.next_id("net");
        let mut state = self.state();
        state.networks.push(DockerNetworkSummary {
            id: id.clone(),
            name: spec.name.clone(),
        });
        state.network_specs.push(spec.clone());
        Ok(id)
    }

    async fn find_networks(&self, name: &str) -> Result<Vec<DockerNetworkSummary>, RuntimeError> {
        self.enter("find_networks")?;
        Ok(self.state().networks.iter().filter(|n| n.name == name).cloned().collect())
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), RuntimeError> {
        self.enter("remove_network")?;
        let mut state = self.state();
        let before = state.networks.len();
        state.networks.retain(|n| n.id != network_id);
        if state.networks.len() == before {
            return Err(not_found(network_id));
        }
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        self.enter("image_exists")?;
        Ok(self.state().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.enter("pull_image")?;
        self.state().images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.enter("create_container")?;
        let id = self.next_id("ctr");
        self.state().containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.enter("start_container")?;
        match self.state().containers.get_mut(container_id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(not_found(container_id)),
        }
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.enter("stop_container")?;
        match self.state().containers.get_mut(container_id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(not_found(container_id)),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.enter("remove_container")?;
        match self.state().containers.remove(container_id) {
            Some(_) => Ok(()),
            None => Err(not_found(container_id)),
        }
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection, RuntimeError> {
        self.enter("inspect_container")?;
        let state = self.state();
        let container = state.containers.get(container_id).ok_or_else(|| not_found(container_id))?;
        Ok(ContainerInspection {
            container_id: container.id.clone(),
            name: container.spec.name.clone(),
            state: if container.running { "running" } else { "exited" }.to_string(),
            running: container.running,
            health: None,
            ports: container
                .spec
                .ports
                .iter()
                .map(|p| PortBindingInfo {
                    container_port: p.key(),
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(p.host_port.to_string()),
                })
                .collect(),
            labels: container.spec.labels.clone(),
        })
    }
}

pub type TestManager = NetworkManager<FakeRuntime, MemoryStore>;

/// Manager over a fresh fake runtime and memory store
pub fn manager() -> (TestManager, Arc<FakeRuntime>, Arc<MemoryStore>) {
    manager_with(OrchestratorSettings::default())
}

pub fn manager_with(settings: OrchestratorSettings) -> (TestManager, Arc<FakeRuntime>, Arc<MemoryStore>) {
    let runtime = Arc::new(FakeRuntime::new());
    let store = Arc::new(MemoryStore::default());
    let manager = NetworkManager::new(settings, Arc::clone(&runtime), Arc::clone(&store));
    (manager, runtime, store)
}

pub type FsTestManager = NetworkManager<FakeRuntime, FsStore>;

/// Manager over a fake runtime and an on-disk store at `<workspace>/networks`
pub fn fs_manager(workspace: &Path) -> (FsTestManager, Arc<FakeRuntime>, Arc<FsStore>) {
    let settings = OrchestratorSettings {
        workspace_root: workspace.to_path_buf(),
        ..OrchestratorSettings::default()
    };
    let runtime = Arc::new(FakeRuntime::new());
    let store = Arc::new(FsStore::new(settings.networks_dir()));
    let manager = NetworkManager::new(settings, Arc::clone(&runtime), Arc::clone(&store));
    (manager, runtime, store)
}

/// Bootnode, one miner and one rpc node
pub fn three_node_network(network_id: &str, chain_id: u64, subnet: &str) -> NetworkConfig {
    NetworkConfig::new(network_id, chain_id)
        .with_subnet(subnet)
        .with_node(BesuNodeConfig::new("boot", NodeType::Bootnode))
        .with_node(BesuNodeConfig::new("miner-1", NodeType::Miner).with_coinbase(COINBASE))
        .with_node(BesuNodeConfig::new("rpc-1", NodeType::Rpc))
}
