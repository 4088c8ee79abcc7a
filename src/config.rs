//! Network, node and orchestrator configuration types.
//!
//! `NetworkConfig` and `BesuNodeConfig` are the caller-facing input contract.
//! They deserialize from camelCase JSON or YAML. `OrchestratorSettings`
//! configures the orchestrator itself (workspace root, Besu image, readiness
//! probing).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Clique block period in seconds
pub const DEFAULT_BLOCK_PERIOD: u64 = 5;
/// Default Clique epoch length in blocks
pub const DEFAULT_EPOCH_LENGTH: u64 = 30000;
/// Default block gas limit (hex quantity)
pub const DEFAULT_GAS_LIMIT: &str = "0x1fffffffffffff";
/// Default genesis difficulty (hex quantity)
pub const DEFAULT_DIFFICULTY: &str = "0x1";
/// Balance credited to every node address in a generated genesis (hex wei, 200 ETH)
pub const DEFAULT_NODE_BALANCE: &str = "0xad78ebc5ac6200000";
/// Default RPC port for the first node of a network
pub const DEFAULT_RPC_PORT: u16 = 8545;
/// Default P2P port for the first node of a network
pub const DEFAULT_P2P_PORT: u16 = 30303;
/// Default Besu image tag
pub const DEFAULT_BESU_VERSION: &str = "latest";

/// Role a Besu node plays inside its network
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Seeded into every other node's `--bootnodes` list
    Bootnode,
    /// Clique signer; runs with `--miner-enabled`
    Miner,
    /// Plain RPC endpoint
    Rpc,
    /// Full validating node that does not sign blocks
    #[serde(alias = "observer")]
    Validator,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Bootnode => "bootnode",
            NodeType::Miner => "miner",
            NodeType::Rpc => "rpc",
            NodeType::Validator => "validator",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bootnode" => Ok(NodeType::Bootnode),
            "miner" => Ok(NodeType::Miner),
            "rpc" => Ok(NodeType::Rpc),
            "validator" | "observer" => Ok(NodeType::Validator),
            other => Err(format!("unknown node type '{}'", other)),
        }
    }
}

/// Configuration of a single Besu node.
///
/// `ip`, `rpc_port` and `p2p_port` may be omitted and are then filled in by
/// [`crate::validation::apply_defaults`]. The identity fields (`address`,
/// `public_key`, `enode`) are populated by the orchestrator once and never
/// regenerated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BesuNodeConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2p_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bootnodes: Vec<String>,
    #[serde(default)]
    pub mining: bool,
    /// Reward address for miner nodes, with or without `0x`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<String>,
}

impl BesuNodeConfig {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        BesuNodeConfig {
            id: id.into(),
            node_type,
            ip: None,
            rpc_port: None,
            p2p_port: None,
            address: None,
            public_key: None,
            enode: None,
            bootnodes: Vec::new(),
            mining: node_type == NodeType::Miner,
            coinbase: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_ports(mut self, rpc_port: u16, p2p_port: u16) -> Self {
        self.rpc_port = Some(rpc_port);
        self.p2p_port = Some(p2p_port);
        self
    }

    pub fn with_coinbase(mut self, coinbase: impl Into<String>) -> Self {
        self.coinbase = Some(coinbase.into());
        self
    }

    pub fn is_bootnode(&self) -> bool {
        self.node_type == NodeType::Bootnode
    }

    pub fn is_miner(&self) -> bool {
        self.node_type == NodeType::Miner
    }

    /// Ports this node occupies on the host (rpc first, then p2p)
    pub fn host_ports(&self) -> Vec<u16> {
        self.rpc_port.into_iter().chain(self.p2p_port).collect()
    }
}

/// Balance entry of a genesis `alloc` map
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AllocEntry {
    pub balance: String,
}

/// Caller adjustments to the generated genesis document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenesisOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    /// Balance credited to every generated node address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_balance: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alloc: BTreeMap<String, AllocEntry>,
}

/// Configuration of a whole network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub network_id: String,
    /// Display name; defaults to `network_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub besu_version: Option<String>,
    #[serde(default)]
    pub nodes: Vec<BesuNodeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_overrides: Option<GenesisOverrides>,
    /// Complete genesis document written verbatim instead of a generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<serde_json::Value>,
}

impl NetworkConfig {
    pub fn new(network_id: impl Into<String>, chain_id: u64) -> Self {
        NetworkConfig {
            network_id: network_id.into(),
            name: None,
            chain_id,
            subnet: None,
            gateway: None,
            besu_version: None,
            nodes: Vec::new(),
            genesis_overrides: None,
            genesis: None,
        }
    }

    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_node(mut self, node: BesuNodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Display name, falling back to the network id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.network_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&BesuNodeConfig> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Docker network name derived from the network id
    pub fn docker_network_name(&self) -> String {
        docker_network_name(&self.network_id)
    }
}

/// `besu-<networkId>`
pub fn docker_network_name(network_id: &str) -> String {
    format!("besu-{}", network_id)
}

/// `besu-<networkId>-<nodeId>`
pub fn container_name(network_id: &str, node_id: &str) -> String {
    format!("besu-{}-{}", network_id, node_id)
}

/// Readiness probing parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessSettings {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Peers required before a node counts as ready
    pub min_peers: u64,
    /// Host used to reach mapped RPC ports
    pub rpc_host: String,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            min_peers: 0,
            rpc_host: "127.0.0.1".to_string(),
        }
    }
}

/// Settings of the orchestrator process
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    /// Directory holding `networks/<networkId>/...`
    pub workspace_root: PathBuf,
    /// Image repository; the tag is the network's `besuVersion`
    pub besu_image: String,
    pub default_besu_version: String,
    /// Tear down partially provisioned networks when creation fails
    pub rollback_on_failure: bool,
    /// Pull the Besu image when it is missing locally
    pub pull_missing_images: bool,
    pub readiness: ReadinessSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            besu_image: "hyperledger/besu".to_string(),
            default_besu_version: DEFAULT_BESU_VERSION.to_string(),
            rollback_on_failure: true,
            pull_missing_images: true,
            readiness: ReadinessSettings::default(),
        }
    }
}

impl OrchestratorSettings {
    /// Root of all network directories
    pub fn networks_dir(&self) -> PathBuf {
        self.workspace_root.join("networks")
    }

    /// Full image reference for a Besu version
    pub fn image_for(&self, besu_version: &str) -> String {
        format!("{}:{}", self.besu_image, besu_version)
    }
}

/// Configuration errors raised while loading input files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Unsupported configuration file extension for {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: String },
}
