//! Network orchestrator.
//!
//! This module coordinates the full lifecycle of a Besu network: defaults,
//! validation and reservation, identity and genesis generation, Docker
//! provisioning, node addition and removal, teardown and status.
//!
//! Every mutating operation holds the network's lock from
//! [`locks::NetworkLocks`]. Validation and reservation additionally run
//! under one process-wide admission lock so two concurrent requests can never
//! both pass the conflict checks for the same resources.

pub mod locks;
pub mod readiness;

use crate::config::{BesuNodeConfig, NetworkConfig, NodeType, OrchestratorSettings};
use crate::docker::{BesuPaths, ContainerInfo, ContainerRuntime, DockerManager, PortBindingInfo};
use crate::error::{OrchestratorError, Result};
use crate::identity::{build_genesis, generate_identity, GenesisParams, NodeCredentials};
use crate::store::{NetworkInfo, NetworkState, NetworkStore};
use crate::validation::{
    apply_defaults, apply_node_defaults, check_node_invariants, is_valid_identifier, suggest_alternatives,
    validate_config, validate_node, Suggestions, ValidationOptions,
};
use locks::NetworkLocks;
use log::{debug, error, info, warn};
use readiness::{wait_for_rpc, HttpRpcProbe, ReadinessOptions, ReadinessReport, RpcProbe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Live status of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub network_id: String,
    pub node_id: String,
    pub node_type: NodeType,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    /// Docker state, `missing` when the container is gone, `absent` when
    /// none was ever recorded
    pub state: String,
    pub running: bool,
    pub health: Option<String>,
    pub ports: Vec<PortBindingInfo>,
    pub ip: Option<String>,
    pub rpc_port: Option<u16>,
    pub p2p_port: Option<u16>,
    pub address: Option<String>,
    pub enode: Option<String>,
}

/// What a teardown actually removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub network_id: String,
    /// Whether the store knew the network
    pub was_tracked: bool,
    pub containers_removed: usize,
    pub container_failures: usize,
    pub docker_networks_removed: usize,
}

/// Reject ids that cannot safely name a directory or a Docker object.
///
/// Runs before any lock, store or runtime access, whatever the configured
/// validation options are.
fn check_ids(network_id: &str, node_ids: &[&str]) -> Result<()> {
    let mut violations = Vec::new();
    if !is_valid_identifier(network_id) {
        violations.push(format!("Invalid network id '{}'", network_id));
    }
    for node_id in node_ids {
        if !is_valid_identifier(node_id) {
            violations.push(format!("Invalid node id '{}'", node_id));
        }
    }
    if violations.is_empty() {
        return Ok(());
    }
    Err(OrchestratorError::Validation {
        network_id: network_id.to_string(),
        violations,
    })
}

/// Manages Besu networks on one container runtime and one store.
pub struct NetworkManager<R: ContainerRuntime + ?Sized, S: NetworkStore + ?Sized> {
    settings: OrchestratorSettings,
    docker: DockerManager<R>,
    store: Arc<S>,
    probe: Arc<dyn RpcProbe>,
    validation: ValidationOptions,
    locks: NetworkLocks,
    admission: Mutex<()>,
}

impl<R: ContainerRuntime + ?Sized, S: NetworkStore + ?Sized> NetworkManager<R, S> {
    pub fn new(settings: OrchestratorSettings, runtime: Arc<R>, store: Arc<S>) -> Self {
        NetworkManager {
            settings,
            docker: DockerManager::new(runtime),
            store,
            probe: Arc::new(HttpRpcProbe::default()),
            validation: ValidationOptions::default(),
            locks: NetworkLocks::new(),
            admission: Mutex::new(()),
        }
    }

    /// Replace the RPC client used by readiness waits
    pub fn with_probe(mut self, probe: Arc<dyn RpcProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the checks run before a network is reserved
    pub fn with_validation_options(mut self, options: ValidationOptions) -> Self {
        self.validation = options;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn docker(&self) -> &DockerManager<R> {
        &self.docker
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn tracked_configs(&self) -> Result<Vec<NetworkConfig>> {
        Ok(self.store.list_networks()?.into_iter().map(|info| info.config).collect())
    }

    fn require_network(&self, network_id: &str) -> Result<NetworkInfo> {
        self.store
            .get_network(network_id)?
            .ok_or_else(|| OrchestratorError::network_not_found(network_id))
    }

    fn image_for(&self, config: &NetworkConfig) -> String {
        let version = config
            .besu_version
            .as_deref()
            .unwrap_or(&self.settings.default_besu_version);
        self.settings.image_for(version)
    }

    async fn prepare_image(&self, image: &str) -> Result<()> {
        if self.settings.pull_missing_images {
            self.docker.ensure_image(image).await?;
        }
        Ok(())
    }

    /// Create a network and start a container for each of its nodes.
    ///
    /// # Arguments
    /// * `config` - Requested configuration; omitted fields are defaulted
    ///
    /// # Returns
    /// * The active network record
    /// * `InvariantViolation` or `Validation` before anything is touched
    /// * Any later failure after the partial network was torn down (unless
    ///   rollback is disabled in the settings)
    pub async fn create_network(&self, config: NetworkConfig) -> Result<NetworkInfo> {
        let network_id = config.network_id.clone();
        let node_ids: Vec<&str> = config.nodes.iter().map(|n| n.id.as_str()).collect();
        check_ids(&network_id, &node_ids)?;
        let _guard = self.locks.lock(&network_id).await;
        info!("Creating network {} (chain id {})", network_id, config.chain_id);

        let reserved = {
            let _admission = self.admission.lock().await;
            let existing = self.tracked_configs()?;
            let config = apply_defaults(&config, &existing, &self.settings.default_besu_version)?;
            for node in &config.nodes {
                check_node_invariants(&network_id, node)?;
            }
            let warnings = validate_config(&config, &self.validation, &existing, Some(&self.docker)).await?;
            if !warnings.is_empty() {
                warn!("Network {} reserved despite {} validation warning(s)", network_id, warnings.len());
            }

            let info = NetworkInfo::reserved(config, self.store.network_path(&network_id));
            self.store.put_network(&info)?;
            debug!("Reserved network {} at {}", network_id, info.network_path.display());
            info
        };

        match self.provision(reserved).await {
            Ok(info) => {
                info!(
                    "Network {} is active with {} node(s) on {}",
                    network_id,
                    info.containers.len(),
                    info.subnet
                );
                Ok(info)
            }
            Err(e) => {
                if self.settings.rollback_on_failure {
                    warn!("Creating network {} failed, rolling back: {}", network_id, e);
                    if let Err(rollback) = self.teardown(&network_id).await {
                        error!("Rollback of network {} failed: {}", network_id, rollback);
                    }
                } else {
                    warn!(
                        "Creating network {} failed; it stays in the creating state until stopped: {}",
                        network_id, e
                    );
                }
                Err(e)
            }
        }
    }

    fn new_identity(&self, network_id: &str, node: &mut BesuNodeConfig) -> Result<NodeCredentials> {
        let ip = node.ip.clone().ok_or_else(|| OrchestratorError::InvariantViolation {
            network_id: network_id.to_string(),
            node_id: Some(node.id.clone()),
            message: "ip must be assigned before an identity is generated".to_string(),
        })?;
        let credentials = generate_identity(&ip);
        self.store.save_credentials(network_id, &node.id, &credentials)?;
        node.address = Some(credentials.address.clone());
        node.public_key = Some(credentials.public_key.clone());
        node.enode = Some(credentials.enode.clone());
        debug!("Node {} of network {} has address {}", node.id, network_id, credentials.address);
        Ok(credentials)
    }

    fn genesis_for(&self, config: &NetworkConfig) -> Result<serde_json::Value> {
        if let Some(genesis) = &config.genesis {
            info!("Using the supplied genesis document for network {}", config.network_id);
            return Ok(genesis.clone());
        }
        let signers: Vec<String> = config
            .nodes
            .iter()
            .filter(|n| n.is_miner())
            .filter_map(|n| n.address.clone())
            .collect();
        if signers.is_empty() {
            warn!("Network {} has no miner nodes; no block will ever be sealed", config.network_id);
        }
        let mut params = GenesisParams::from_overrides(config.genesis_overrides.as_ref());
        params.endowed = config.nodes.iter().filter_map(|n| n.address.clone()).collect();

        let document = build_genesis(config.chain_id, &signers, &params);
        serde_json::to_value(&document).map_err(|e| OrchestratorError::serialization("genesis document", e))
    }

    async fn provision(&self, mut info: NetworkInfo) -> Result<NetworkInfo> {
        let network_id = info.network_id.clone();

        // Bootnodes first so their enodes can be handed to everyone else
        let mut bootnodes = Vec::new();
        for node in info.config.nodes.iter_mut().filter(|n| n.is_bootnode()) {
            bootnodes.push(self.new_identity(&network_id, node)?.enode);
        }
        for node in info.config.nodes.iter_mut().filter(|n| !n.is_bootnode()) {
            self.new_identity(&network_id, node)?;
            for enode in &bootnodes {
                if !node.bootnodes.contains(enode) {
                    node.bootnodes.push(enode.clone());
                }
            }
        }
        self.store.put_network(&info)?;

        let genesis = self.genesis_for(&info.config)?;
        let genesis_path = self.store.write_genesis(&network_id, &genesis)?;
        debug!("Wrote genesis for {} to {}", network_id, genesis_path.display());

        let image = self.image_for(&info.config);
        self.prepare_image(&image).await?;

        let docker_network_id = self.docker.create_docker_network(&info.config).await?;
        info.docker_network_id = Some(docker_network_id);
        self.store.put_network(&info)?;

        for node in &info.config.nodes {
            let paths = BesuPaths::for_node(&info.network_path, &self.store.node_path(&network_id, &node.id));
            let container = self
                .docker
                .create_besu_container(&info.config, node, &image, &paths)
                .await?;
            info.containers.insert(node.id.clone(), container);
            self.store.put_network(&info)?;
        }

        info.state = NetworkState::Active;
        self.store.put_network(&info)?;
        Ok(info)
    }

    /// Add a node to a tracked network and start its container.
    pub async fn add_node(&self, network_id: &str, node: BesuNodeConfig) -> Result<ContainerInfo> {
        check_ids(network_id, &[node.id.as_str()])?;
        let _guard = self.locks.lock(network_id).await;
        let mut info = self.require_network(network_id)?;

        if info.node(&node.id).is_some() {
            return Err(OrchestratorError::Validation {
                network_id: network_id.to_string(),
                violations: vec![format!("Node '{}' already exists in network '{}'", node.id, network_id)],
            });
        }
        check_node_invariants(network_id, &node)?;

        let node = {
            let _admission = self.admission.lock().await;
            let existing = self.tracked_configs()?;
            let node = apply_node_defaults(&info.config, &node, &existing)?;
            validate_node(&info.config, &node, &existing)?;
            info.config.nodes.push(node.clone());
            self.store.put_network(&info)?;
            node
        };
        info!("Adding {} node {} to network {}", node.node_type, node.id, network_id);

        let node_id = node.id.clone();
        match self.provision_node(&mut info, node).await {
            Ok(container) => Ok(container),
            Err(e) => {
                if self.settings.rollback_on_failure {
                    warn!("Adding node {} to {} failed, releasing it: {}", node_id, network_id, e);
                    self.release_node(&mut info, &node_id).await;
                }
                Err(e)
            }
        }
    }

    async fn provision_node(&self, info: &mut NetworkInfo, mut node: BesuNodeConfig) -> Result<ContainerInfo> {
        let network_id = info.network_id.clone();
        let credentials = self.new_identity(&network_id, &mut node)?;

        for enode in self.store.bootnode_enodes(&network_id)? {
            if enode != credentials.enode && !node.bootnodes.contains(&enode) {
                node.bootnodes.push(enode);
            }
        }

        let image = self.image_for(&info.config);
        self.prepare_image(&image).await?;
        let paths = BesuPaths::for_node(&info.network_path, &self.store.node_path(&network_id, &node.id));
        let container = self
            .docker
            .create_besu_container(&info.config, &node, &image, &paths)
            .await?;

        if let Some(slot) = info.config.nodes.iter_mut().find(|n| n.id == node.id) {
            *slot = node.clone();
        }
        info.containers.insert(node.id.clone(), container.clone());
        self.store.put_network(info)?;
        info!("Node {} joined network {} as {}", node.id, network_id, container.container_name);
        Ok(container)
    }

    /// Undo a node reservation, best effort
    async fn release_node(&self, info: &mut NetworkInfo, node_id: &str) {
        if let Some(container) = info.containers.remove(node_id) {
            if let Err(e) = self.docker.remove_container(&container.container_id).await {
                warn!("Failed to remove container of node {}: {}", node_id, e);
            }
        }
        info.config.nodes.retain(|n| n.id != node_id);
        if let Err(e) = self.store.remove_node_files(&info.network_id, node_id) {
            warn!("Failed to delete files of node {}: {}", node_id, e);
        }
        if let Err(e) = self.store.put_network(info) {
            warn!("Failed to release node {} in network {}: {}", node_id, info.network_id, e);
        }
    }

    /// Stop and remove a node's container and forget the node.
    pub async fn remove_node(&self, network_id: &str, node_id: &str) -> Result<()> {
        check_ids(network_id, &[node_id])?;
        let _guard = self.locks.lock(network_id).await;
        let mut info = self.require_network(network_id)?;
        if info.node(node_id).is_none() {
            return Err(OrchestratorError::node_not_found(network_id, node_id));
        }

        if let Some(container) = info.containers.get(node_id) {
            self.docker.remove_container(&container.container_id).await?;
        }
        self.store.remove_node_files(network_id, node_id)?;

        info.containers.remove(node_id);
        info.config.nodes.retain(|n| n.id != node_id);
        self.store.put_network(&info)?;
        info!("Removed node {} from network {}", node_id, network_id);
        Ok(())
    }

    /// Tear down a network. Best effort and idempotent: container failures
    /// are logged, and the Docker network and directory are removed even
    /// when the store has no record of the network.
    pub async fn stop_network(&self, network_id: &str) -> Result<StopReport> {
        check_ids(network_id, &[])?;
        let report = {
            let _guard = self.locks.lock(network_id).await;
            info!("Stopping network {}", network_id);
            self.teardown(network_id).await?
        };
        self.locks.prune();
        Ok(report)
    }

    async fn teardown(&self, network_id: &str) -> Result<StopReport> {
        let record = match self.store.get_network(network_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("Cannot read the record of network {}: {}", network_id, e);
                None
            }
        };

        let mut report = StopReport {
            network_id: network_id.to_string(),
            was_tracked: record.is_some(),
            containers_removed: 0,
            container_failures: 0,
            docker_networks_removed: 0,
        };

        if let Some(mut info) = record {
            info.state = NetworkState::Stopping;
            if let Err(e) = self.store.put_network(&info) {
                warn!("Cannot mark network {} as stopping: {}", network_id, e);
            }
            for (node_id, container) in &info.containers {
                match self.docker.remove_container(&container.container_id).await {
                    Ok(()) => report.containers_removed += 1,
                    Err(e) => {
                        report.container_failures += 1;
                        warn!("Failed to remove container of node {} in {}: {}", node_id, network_id, e);
                    }
                }
            }
        } else {
            debug!("Network {} is not tracked; cleaning up leftovers only", network_id);
        }

        match self.docker.remove_docker_network(network_id).await {
            Ok(removed) => report.docker_networks_removed = removed,
            Err(e) => warn!("Failed to remove Docker network of {}: {}", network_id, e),
        }

        self.store.purge_network(network_id)?;
        info!(
            "Network {} stopped ({} container(s), {} Docker network(s) removed)",
            network_id, report.containers_removed, report.docker_networks_removed
        );
        Ok(report)
    }

    /// Live container state plus the node's persisted identity.
    pub async fn get_node_status(&self, network_id: &str, node_id: &str) -> Result<NodeStatus> {
        check_ids(network_id, &[node_id])?;
        let info = self.require_network(network_id)?;
        let node = info
            .node(node_id)
            .ok_or_else(|| OrchestratorError::node_not_found(network_id, node_id))?;
        let credentials = self.store.load_credentials(network_id, node_id)?;

        let mut status = NodeStatus {
            network_id: network_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node.node_type,
            container_id: None,
            container_name: None,
            state: "absent".to_string(),
            running: false,
            health: None,
            ports: Vec::new(),
            ip: node.ip.clone(),
            rpc_port: node.rpc_port,
            p2p_port: node.p2p_port,
            address: credentials.as_ref().map(|c| c.address.clone()).or_else(|| node.address.clone()),
            enode: credentials.map(|c| c.enode).or_else(|| node.enode.clone()),
        };

        if let Some(container) = info.containers.get(node_id) {
            status.container_id = Some(container.container_id.clone());
            status.container_name = Some(container.container_name.clone());
            match self
                .docker
                .inspect_container(network_id, node_id, &container.container_id)
                .await
            {
                Ok(inspection) => {
                    status.state = inspection.state;
                    status.running = inspection.running;
                    status.health = inspection.health;
                    status.ports = inspection.ports;
                }
                Err(OrchestratorError::DockerOperation { source, .. }) if source.is_not_found() => {
                    warn!("Container of node {} in {} no longer exists", node_id, network_id);
                    status.state = "missing".to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(status)
    }

    pub fn list_networks(&self) -> Result<Vec<NetworkInfo>> {
        self.store.list_networks()
    }

    pub fn get_network(&self, network_id: &str) -> Result<NetworkInfo> {
        check_ids(network_id, &[])?;
        self.require_network(network_id)
    }

    /// Alternatives for a configuration that collides with tracked networks
    pub fn suggest_alternatives(&self, config: &NetworkConfig) -> Result<Suggestions> {
        let existing = self.tracked_configs()?;
        Ok(suggest_alternatives(config, &existing))
    }

    /// Wait until a node answers JSON-RPC on its host port.
    ///
    /// # Arguments
    /// * `network_id`, `node_id` - The node to probe
    /// * `cancel` - Send `true` to abandon the wait
    pub async fn wait_until_ready(
        &self,
        network_id: &str,
        node_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReadinessReport> {
        check_ids(network_id, &[node_id])?;
        let info = self.require_network(network_id)?;
        let node = info
            .node(node_id)
            .ok_or_else(|| OrchestratorError::node_not_found(network_id, node_id))?;
        let rpc_port = node.rpc_port.ok_or_else(|| OrchestratorError::InvariantViolation {
            network_id: network_id.to_string(),
            node_id: Some(node_id.to_string()),
            message: "node has no RPC port".to_string(),
        })?;

        let endpoint = format!("http://{}:{}", self.settings.readiness.rpc_host, rpc_port);
        let options = ReadinessOptions::from(&self.settings.readiness);
        debug!("Waiting for node {} of {} at {}", node_id, network_id, endpoint);
        wait_for_rpc(self.probe.as_ref(), &endpoint, network_id, node_id, &options, cancel).await
    }

    /// Wait for every node of a network, in node order
    pub async fn wait_until_network_ready(
        &self,
        network_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<ReadinessReport>> {
        check_ids(network_id, &[])?;
        let info = self.require_network(network_id)?;
        let mut reports = Vec::with_capacity(info.config.nodes.len());
        for node in &info.config.nodes {
            reports.push(self.wait_until_ready(network_id, &node.id, cancel.clone()).await?);
        }
        Ok(reports)
    }
}
