//! # Network store
//!
//! The store is the single source of truth for which networks the
//! orchestrator manages and for every node's identity. Two backings exist:
//!
//! - [`MemoryStore`]: process-local maps, used by tests
//! - [`FsStore`]: the on-disk workspace, used in production
//!
//! ## On-disk layout
//!
//! ```text
//! <workspace>/networks/
//! \-- <networkId>/
//!     |-- network.json        # NetworkInfo record
//!     |-- genesis.json
//!     \-- <nodeId>/
//!         |-- key             # private key, hex, no 0x
//!         |-- key.pub         # public key, hex, no 0x
//!         |-- address         # account address, hex, no 0x
//!         \-- enode           # full enode:// URL
//! ```
//!
//! Both backings report the same paths so container bind mounts can be
//! computed without caring which one is in use.

pub mod memory;
pub mod fs;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::config::{BesuNodeConfig, NetworkConfig, NodeType};
use crate::docker::ContainerInfo;
use crate::error::Result;
use crate::identity::NodeCredentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lifecycle state of a tracked network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    /// Validated and reserved; Docker objects are being created
    Creating,
    Active,
    Stopping,
}

/// Runtime record of a tracked network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_id: String,
    pub docker_network_id: Option<String>,
    pub chain_id: u64,
    pub subnet: String,
    pub gateway: String,
    pub network_path: PathBuf,
    pub state: NetworkState,
    /// Effective configuration, nodes included with identities filled in
    pub config: NetworkConfig,
    /// Containers keyed by node id
    pub containers: BTreeMap<String, ContainerInfo>,
    pub created_at: DateTime<Utc>,
}

impl NetworkInfo {
    /// Record for a network that passed validation but has no Docker objects yet
    pub fn reserved(config: NetworkConfig, network_path: PathBuf) -> Self {
        NetworkInfo {
            network_id: config.network_id.clone(),
            docker_network_id: None,
            chain_id: config.chain_id,
            subnet: config.subnet.clone().unwrap_or_default(),
            gateway: config.gateway.clone().unwrap_or_default(),
            network_path,
            state: NetworkState::Creating,
            config,
            containers: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&BesuNodeConfig> {
        self.config.node(node_id)
    }

    pub fn node_type(&self, node_id: &str) -> Option<NodeType> {
        self.node(node_id).map(|n| n.node_type)
    }
}

/// Storage of tracked networks and node identities.
///
/// Implementations are shared between concurrent operations and must be
/// internally synchronized. Mutating calls are serialized per network by
/// the orchestrator.
pub trait NetworkStore: Send + Sync {
    /// Directory of a network (`<root>/<networkId>`)
    fn network_path(&self, network_id: &str) -> PathBuf;

    /// Directory of a node (`<root>/<networkId>/<nodeId>`)
    fn node_path(&self, network_id: &str, node_id: &str) -> PathBuf {
        self.network_path(network_id).join(node_id)
    }

    /// Insert or replace a network record
    fn put_network(&self, info: &NetworkInfo) -> Result<()>;

    fn get_network(&self, network_id: &str) -> Result<Option<NetworkInfo>>;

    /// Every tracked network. Fails when any record cannot be read.
    fn list_networks(&self) -> Result<Vec<NetworkInfo>>;

    /// Forget a network and delete everything stored for it. Idempotent.
    fn purge_network(&self, network_id: &str) -> Result<()>;

    /// Persist a node's key material; returns the node directory
    fn save_credentials(
        &self,
        network_id: &str,
        node_id: &str,
        credentials: &NodeCredentials,
    ) -> Result<PathBuf>;

    fn load_credentials(&self, network_id: &str, node_id: &str) -> Result<Option<NodeCredentials>>;

    /// Delete a node's directory. Idempotent.
    fn remove_node_files(&self, network_id: &str, node_id: &str) -> Result<()>;

    /// Write `genesis.json`; returns its path
    fn write_genesis(&self, network_id: &str, genesis: &serde_json::Value) -> Result<PathBuf>;

    /// Enodes of every bootnode of a network, in node order.
    ///
    /// Node types come from the network record; enodes from the persisted
    /// credentials. Bootnodes without stored credentials are skipped.
    fn bootnode_enodes(&self, network_id: &str) -> Result<Vec<String>> {
        let info = match self.get_network(network_id)? {
            Some(info) => info,
            None => return Ok(Vec::new()),
        };
        let mut enodes = Vec::new();
        for node in info.config.nodes.iter().filter(|n| n.is_bootnode()) {
            match self.load_credentials(network_id, &node.id)? {
                Some(creds) => enodes.push(creds.enode),
                None => log::warn!(
                    "Bootnode {} of network {} has no stored credentials",
                    node.id,
                    network_id
                ),
            }
        }
        Ok(enodes)
    }
}
