//! Container runtime adapter.
//!
//! ## Layers
//!
//! - [`ContainerRuntime`]: the slice of the Docker Engine API the orchestrator
//!   needs, as an async trait. [`BollardRuntime`] talks to a real daemon;
//!   tests substitute a recording fake.
//! - [`spec`]: pure translation of network/node configuration into
//!   [`NetworkSpec`] and [`ContainerSpec`], including the Besu argument vector.
//! - [`DockerManager`]: the provisioning operations (create network, create
//!   and start a node container, idempotent removal) on top of any runtime.

pub mod spec;
pub mod manager;
pub mod bollard_runtime;

pub use bollard_runtime::BollardRuntime;
pub use manager::DockerManager;
pub use spec::{besu_args, container_spec, network_spec, BesuPaths};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label carrying the owning network id
pub const LABEL_NETWORK_ID: &str = "networkId";
/// Label carrying the node id of a container
pub const LABEL_NODE_ID: &str = "nodeId";
/// Label carrying the node type of a container
pub const LABEL_NODE_TYPE: &str = "nodeType";

/// Failures reported by a container runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The daemon answered 404 for the resource
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("daemon returned {status}: {message}")]
    Daemon { status: u16, message: String },

    #[error("cannot reach the Docker daemon: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

/// Bridge network to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub subnet: String,
    pub gateway: String,
    pub labels: BTreeMap<String, String>,
}

/// Transport protocol of a published port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Container port published on the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Docker's `<port>/<proto>` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol.as_str())
    }
}

/// Read-only or read-write bind mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl BindMount {
    /// Docker's `host:container[:ro]` form
    pub fn to_bind_string(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host_path, self.container_path)
        } else {
            format!("{}:{}", self.host_path, self.container_path)
        }
    }
}

/// Container to create and start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub binds: Vec<BindMount>,
    pub ports: Vec<PortMapping>,
    /// Docker network to attach to
    pub network: String,
    /// Fixed address on `network`
    pub ipv4_address: String,
}

/// Container lifecycle status as tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

/// Container created for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// Node id
    pub id: String,
    pub container_id: String,
    pub container_name: String,
    pub status: ContainerStatus,
}

/// Host side of a published port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBindingInfo {
    /// `<port>/<proto>` inside the container
    pub container_port: String,
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// Live container state reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInspection {
    pub container_id: String,
    pub name: String,
    /// Docker state string (`running`, `exited`, ...)
    pub state: String,
    pub running: bool,
    pub health: Option<String>,
    pub ports: Vec<PortBindingInfo>,
    pub labels: BTreeMap<String, String>,
}

/// Docker network as listed by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerNetworkSummary {
    pub id: String,
    pub name: String,
}

/// Docker Engine operations used by the orchestrator.
///
/// Implementations report a missing resource as [`RuntimeError::NotFound`];
/// callers rely on that to make removal idempotent.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Liveness probe against the daemon
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Create a network and return its id
    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, RuntimeError>;

    /// Networks whose name is exactly `name`
    async fn find_networks(&self, name: &str) -> Result<Vec<DockerNetworkSummary>, RuntimeError>;

    async fn remove_network(&self, network_id: &str) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection, RuntimeError>;
}
