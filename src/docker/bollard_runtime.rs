//! [`ContainerRuntime`] backed by the Docker Engine API through `bollard`.

use super::{
    ContainerInspection, ContainerRuntime, ContainerSpec, DockerNetworkSummary, NetworkSpec,
    PortBindingInfo, RuntimeError,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, NetworkingConfig,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    EndpointIpamConfig, EndpointSettings, HostConfig, Ipam, IpamConfig, PortBinding,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use futures::TryStreamExt;
use std::collections::{BTreeMap, HashMap};

/// Seconds the daemon waits for Besu to exit before killing it
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker daemon client
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    /// Connect through `DOCKER_HOST` or the platform's default socket
    pub fn connect_local() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(BollardRuntime { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        BollardRuntime { docker }
    }
}

fn map_error(resource: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound {
            resource: resource.to_string(),
        },
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Daemon {
            status: status_code,
            message,
        },
        other => RuntimeError::Other(other.to_string()),
    }
}

/// Split `repo:tag`, keeping registry ports (`host:5000/repo`) intact
fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            check_duplicate: true,
            driver: spec.driver.clone(),
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(spec.subnet.clone()),
                    gateway: Some(spec.gateway.clone()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            labels: spec.labels.clone().into_iter().collect::<HashMap<_, _>>(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| map_error(&format!("network {}", spec.name), e))?;
        Option::<String>::from(response.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RuntimeError::Other(format!("daemon returned no id for network {}", spec.name)))
    }

    async fn find_networks(&self, name: &str) -> Result<Vec<DockerNetworkSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![name]);
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await
            .map_err(|e| map_error("networks", e))?;

        // The daemon's name filter matches substrings
        Ok(networks
            .into_iter()
            .filter(|n| n.name.as_deref() == Some(name))
            .filter_map(|n| {
                Some(DockerNetworkSummary {
                    id: n.id?,
                    name: n.name?,
                })
            })
            .collect())
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_network(network_id)
            .await
            .map_err(|e| map_error(&format!("network {}", network_id), e))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => match map_error(image, e) {
                RuntimeError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let (repo, tag) = split_image(image);
        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map(|_| ())
            .map_err(|e| map_error(&format!("image {}", image), e))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (p.key(), HashMap::new()))
            .collect();
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                (
                    p.key(),
                    Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(p.host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let mut endpoints_config = HashMap::new();
        endpoints_config.insert(
            spec.network.clone(),
            EndpointSettings {
                ipam_config: Some(EndpointIpamConfig {
                    ipv4_address: Some(spec.ipv4_address.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.args.clone()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.iter().map(|b| b.to_bind_string()).collect()),
                port_bindings: Some(port_bindings),
                network_mode: Some(spec.network.clone()),
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig { endpoints_config }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_error(&format!("container {}", spec.name), e))?;
        for warning in &response.warnings {
            log::warn!("Docker warning for {}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| map_error(&format!("container {}", container_id), e))
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptions { t: STOP_TIMEOUT_SECS };
        match self.docker.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_error(&format!("container {}", container_id), e)),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| map_error(&format!("container {}", container_id), e))
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection, RuntimeError> {
        let response = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(&format!("container {}", container_id), e))?;

        let state = response.state.unwrap_or_default();
        let health = state
            .health
            .and_then(|h| h.status)
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        let mut ports: Vec<PortBindingInfo> = Vec::new();
        if let Some(port_map) = response.network_settings.and_then(|ns| ns.ports) {
            for (container_port, bindings) in port_map {
                match bindings {
                    Some(bindings) if !bindings.is_empty() => {
                        for binding in bindings {
                            ports.push(PortBindingInfo {
                                container_port: container_port.clone(),
                                host_ip: binding.host_ip,
                                host_port: binding.host_port,
                            });
                        }
                    }
                    _ => ports.push(PortBindingInfo {
                        container_port,
                        host_ip: None,
                        host_port: None,
                    }),
                }
            }
        }
        ports.sort_by(|a, b| a.container_port.cmp(&b.container_port));

        let labels: BTreeMap<String, String> = response
            .config
            .and_then(|c| c.labels)
            .map(|l| l.into_iter().collect())
            .unwrap_or_default();

        Ok(ContainerInspection {
            container_id: response.id.unwrap_or_else(|| container_id.to_string()),
            name: response
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            state: state.status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string()),
            running: state.running.unwrap_or(false),
            health,
            ports,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("hyperledger/besu:24.12.2"), ("hyperledger/besu", "24.12.2"));
        assert_eq!(split_image("hyperledger/besu"), ("hyperledger/besu", "latest"));
        assert_eq!(split_image("registry:5000/besu"), ("registry:5000/besu", "latest"));
        assert_eq!(split_image("registry:5000/besu:1.0"), ("registry:5000/besu", "1.0"));
    }

    #[test]
    fn test_map_not_found() {
        let err = map_error(
            "container x",
            BollardError::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(err.is_not_found());

        let err = map_error(
            "container x",
            BollardError::DockerResponseServerError {
                status_code: 500,
                message: "boom".to_string(),
            },
        );
        assert!(matches!(err, RuntimeError::Daemon { status: 500, .. }));
    }
}
