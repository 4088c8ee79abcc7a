//! Provisioning operations on top of a [`ContainerRuntime`].

use super::spec::{container_spec, network_spec, BesuPaths};
use super::{ContainerInfo, ContainerInspection, ContainerRuntime, ContainerStatus, RuntimeError};
use crate::config::{docker_network_name, BesuNodeConfig, NetworkConfig};
use crate::error::{OrchestratorError, Result};
use log::{debug, info, warn};
use std::sync::Arc;

/// Creates and removes the Docker objects backing Besu networks.
///
/// The runtime is injected, so several managers (and tests) can run side by
/// side against different daemons or fakes.
pub struct DockerManager<R: ContainerRuntime + ?Sized> {
    runtime: Arc<R>,
}

impl<R: ContainerRuntime + ?Sized> Clone for DockerManager<R> {
    fn clone(&self) -> Self {
        DockerManager {
            runtime: Arc::clone(&self.runtime),
        }
    }
}

fn docker_error(
    operation: &str,
    network_id: Option<&str>,
    node_id: Option<&str>,
    source: RuntimeError,
) -> OrchestratorError {
    OrchestratorError::DockerOperation {
        operation: operation.to_string(),
        network_id: network_id.map(str::to_string),
        node_id: node_id.map(str::to_string),
        source,
    }
}

impl<R: ContainerRuntime + ?Sized> DockerManager<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        DockerManager { runtime }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// Daemon liveness probe
    pub async fn is_docker_available(&self) -> bool {
        match self.runtime.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Docker daemon is not available: {}", e);
                false
            }
        }
    }

    /// Create the `besu-<networkId>` bridge network and return its Docker id
    pub async fn create_docker_network(&self, config: &NetworkConfig) -> Result<String> {
        let spec = network_spec(config)?;
        let id = self
            .runtime
            .create_network(&spec)
            .await
            .map_err(|e| docker_error("create network", Some(&config.network_id), None, e))?;
        info!("Created Docker network {} ({}) for {}", spec.name, id, config.network_id);
        Ok(id)
    }

    /// Whether any Docker network is literally named `besu-<networkId>`
    pub async fn docker_network_exists(&self, network_id: &str) -> Result<bool> {
        let name = docker_network_name(network_id);
        let found = self
            .runtime
            .find_networks(&name)
            .await
            .map_err(|e| docker_error("list networks", Some(network_id), None, e))?;
        Ok(!found.is_empty())
    }

    /// Pull `image` unless the daemon already has it
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        let present = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| docker_error("inspect image", None, None, e))?;
        if present {
            debug!("Image {} already present", image);
            return Ok(());
        }
        info!("Pulling image {}", image);
        self.runtime
            .pull_image(image)
            .await
            .map_err(|e| docker_error("pull image", None, None, e))
    }

    /// Create and start the container of a node.
    ///
    /// The node is reported as running as soon as the daemon accepts the
    /// start; readiness of Besu itself is probed separately.
    pub async fn create_besu_container(
        &self,
        config: &NetworkConfig,
        node: &BesuNodeConfig,
        image: &str,
        paths: &BesuPaths,
    ) -> Result<ContainerInfo> {
        let spec = container_spec(config, node, image, paths)?;
        let network_id = config.network_id.as_str();

        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| docker_error("create container", Some(network_id), Some(&node.id), e))?;
        debug!("Created container {} ({}) for node {}", spec.name, container_id, node.id);

        if let Err(e) = self.runtime.start_container(&container_id).await {
            // Not recorded anywhere yet, so nobody else would clean it up
            if let Err(cleanup) = self.runtime.remove_container(&container_id).await {
                warn!("Failed to remove unstarted container {}: {}", container_id, cleanup);
            }
            return Err(docker_error("start container", Some(network_id), Some(&node.id), e));
        }
        info!(
            "Started {} node {} at {} (rpc {}, p2p {})",
            node.node_type,
            node.id,
            spec.ipv4_address,
            node.rpc_port.unwrap_or_default(),
            node.p2p_port.unwrap_or_default()
        );

        Ok(ContainerInfo {
            id: node.id.clone(),
            container_id,
            container_name: spec.name,
            status: ContainerStatus::Running,
        })
    }

    /// Stop then remove a container. A container that is already gone counts
    /// as removed.
    pub async fn remove_container(&self, container_id: &str) -> Result<()> {
        match self.runtime.stop_container(container_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Container {} already gone", container_id);
                return Ok(());
            }
            Err(e) => return Err(docker_error("stop container", None, None, e)),
        }

        match self.runtime.remove_container(container_id).await {
            Ok(()) => {
                debug!("Removed container {}", container_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Container {} vanished before removal", container_id);
                Ok(())
            }
            Err(e) => Err(docker_error("remove container", None, None, e)),
        }
    }

    /// Remove every Docker network named `besu-<networkId>`.
    ///
    /// Returns how many networks were removed.
    pub async fn remove_docker_network(&self, network_id: &str) -> Result<usize> {
        let name = docker_network_name(network_id);
        let matches = self
            .runtime
            .find_networks(&name)
            .await
            .map_err(|e| docker_error("list networks", Some(network_id), None, e))?;

        let mut removed = 0;
        for network in matches {
            match self.runtime.remove_network(&network.id).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {
                    debug!("Docker network {} already gone", network.id);
                }
                Err(e) => return Err(docker_error("remove network", Some(network_id), None, e)),
            }
        }
        if removed > 1 {
            warn!("Removed {} duplicate Docker networks named {}", removed, name);
        }
        Ok(removed)
    }

    pub async fn inspect_container(
        &self,
        network_id: &str,
        node_id: &str,
        container_id: &str,
    ) -> Result<ContainerInspection> {
        self.runtime
            .inspect_container(container_id)
            .await
            .map_err(|e| docker_error("inspect container", Some(network_id), Some(node_id), e))
    }
}
