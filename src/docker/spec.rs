//! Besu container and network specifications.
//!
//! This module translates a network/node configuration into the exact
//! Docker objects the orchestrator creates. It is pure: the same inputs
//! always give the same [`NetworkSpec`] / [`ContainerSpec`].
//!
//! ## Besu command line
//!
//! Every node gets the same base flags:
//! - data, genesis and node-key paths inside the container
//! - `--network-id=<chainId>` and full sync
//! - HTTP JSON-RPC on `0.0.0.0:<rpcPort>` with a fixed API set
//! - P2P on `<p2pPort>` with discovery enabled
//!
//! Role specific flags are appended:
//! - `--bootnodes=<enode,...>` when the node has bootnodes
//! - `--miner-enabled --miner-coinbase=<address>` for miners

use super::{
    BindMount, ContainerSpec, NetworkSpec, PortMapping, Protocol, LABEL_NETWORK_ID, LABEL_NODE_ID,
    LABEL_NODE_TYPE,
};
use crate::config::{container_name, docker_network_name, BesuNodeConfig, NetworkConfig, NodeType};
use crate::error::{OrchestratorError, Result};
use crate::identity::normalize_address;
use std::collections::BTreeMap;
use std::path::Path;

/// Container-side path of the Besu data directory
pub const CONTAINER_DATA_PATH: &str = "/opt/besu/data";
/// Container-side path of the genesis file
pub const CONTAINER_GENESIS_PATH: &str = "/opt/besu/genesis.json";
/// Container-side path of the node key
pub const CONTAINER_KEY_PATH: &str = "/opt/besu/keys/key";
/// JSON-RPC namespaces exposed by every node
pub const RPC_APIS: &str = "ETH,NET,WEB3,CLIQUE,ADMIN,TXPOOL";

/// Host files a node container is started from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BesuPaths {
    pub genesis_file: String,
    pub key_file: String,
}

impl BesuPaths {
    /// Standard layout: `<networkPath>/genesis.json` and `<nodePath>/key`
    pub fn for_node(network_path: &Path, node_path: &Path) -> Self {
        BesuPaths {
            genesis_file: network_path.join("genesis.json").to_string_lossy().into_owned(),
            key_file: node_path.join("key").to_string_lossy().into_owned(),
        }
    }
}

fn missing_field(network_id: &str, node: &BesuNodeConfig, field: &str) -> OrchestratorError {
    OrchestratorError::InvariantViolation {
        network_id: network_id.to_string(),
        node_id: Some(node.id.clone()),
        message: format!("{} must be set before a container can be built", field),
    }
}

/// Build the Besu argument vector for a node.
///
/// # Arguments
/// * `chain_id` - Chain id, passed as `--network-id`
/// * `node` - Node configuration with ports, bootnodes and role filled in
///
/// # Returns
/// * The flags in a fixed order, or an `InvariantViolation` when a port is
///   missing or a miner has no coinbase
pub fn besu_args(network_id: &str, chain_id: u64, node: &BesuNodeConfig) -> Result<Vec<String>> {
    let rpc_port = node.rpc_port.ok_or_else(|| missing_field(network_id, node, "rpcPort"))?;
    let p2p_port = node.p2p_port.ok_or_else(|| missing_field(network_id, node, "p2pPort"))?;

    let mut args = vec![
        format!("--data-path={}", CONTAINER_DATA_PATH),
        format!("--genesis-file={}", CONTAINER_GENESIS_PATH),
        format!("--node-private-key-file={}", CONTAINER_KEY_PATH),
        format!("--network-id={}", chain_id),
        "--sync-mode=FULL".to_string(),
        "--rpc-http-enabled".to_string(),
        "--rpc-http-host=0.0.0.0".to_string(),
        format!("--rpc-http-port={}", rpc_port),
        format!("--rpc-http-api={}", RPC_APIS),
        "--rpc-http-cors-origins=*".to_string(),
        "--host-allowlist=*".to_string(),
        format!("--p2p-port={}", p2p_port),
        "--discovery-enabled=true".to_string(),
    ];

    if !node.bootnodes.is_empty() {
        args.push(format!("--bootnodes={}", node.bootnodes.join(",")));
    }

    if node.node_type == NodeType::Miner {
        let coinbase = node
            .coinbase
            .as_deref()
            .ok_or_else(|| missing_field(network_id, node, "coinbase"))?;
        args.push("--miner-enabled".to_string());
        args.push(format!("--miner-coinbase=0x{}", normalize_address(coinbase)));
    }

    Ok(args)
}

/// Docker network for a Besu network: `besu-<networkId>`, bridge driver,
/// IPAM from the subnet and gateway.
pub fn network_spec(config: &NetworkConfig) -> Result<NetworkSpec> {
    let subnet = config
        .subnet
        .clone()
        .ok_or_else(|| OrchestratorError::InvariantViolation {
            network_id: config.network_id.clone(),
            node_id: None,
            message: "subnet must be set before the Docker network is created".to_string(),
        })?;
    let gateway = config
        .gateway
        .clone()
        .ok_or_else(|| OrchestratorError::InvariantViolation {
            network_id: config.network_id.clone(),
            node_id: None,
            message: "gateway must be set before the Docker network is created".to_string(),
        })?;

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NETWORK_ID.to_string(), config.network_id.clone());

    Ok(NetworkSpec {
        name: docker_network_name(&config.network_id),
        driver: "bridge".to_string(),
        subnet,
        gateway,
        labels,
    })
}

/// Container for a node.
///
/// # Arguments
/// * `config` - Owning network (chain id, Besu version, network id)
/// * `node` - Node with ip, ports and bootnodes filled in
/// * `image` - Full image reference
/// * `paths` - Host genesis and key files, bound read-only
pub fn container_spec(
    config: &NetworkConfig,
    node: &BesuNodeConfig,
    image: &str,
    paths: &BesuPaths,
) -> Result<ContainerSpec> {
    let args = besu_args(&config.network_id, config.chain_id, node)?;
    let ip = node
        .ip
        .clone()
        .ok_or_else(|| missing_field(&config.network_id, node, "ip"))?;
    // Ports were checked by besu_args
    let rpc_port = node.rpc_port.unwrap_or_default();
    let p2p_port = node.p2p_port.unwrap_or_default();

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NETWORK_ID.to_string(), config.network_id.clone());
    labels.insert(LABEL_NODE_ID.to_string(), node.id.clone());
    labels.insert(LABEL_NODE_TYPE.to_string(), node.node_type.to_string());

    Ok(ContainerSpec {
        name: container_name(&config.network_id, &node.id),
        image: image.to_string(),
        args,
        labels,
        binds: vec![
            BindMount {
                host_path: paths.genesis_file.clone(),
                container_path: CONTAINER_GENESIS_PATH.to_string(),
                read_only: true,
            },
            BindMount {
                host_path: paths.key_file.clone(),
                container_path: CONTAINER_KEY_PATH.to_string(),
                read_only: true,
            },
        ],
        ports: vec![
            PortMapping {
                container_port: rpc_port,
                host_port: rpc_port,
                protocol: Protocol::Tcp,
            },
            PortMapping {
                container_port: p2p_port,
                host_port: p2p_port,
                protocol: Protocol::Tcp,
            },
            PortMapping {
                container_port: p2p_port,
                host_port: p2p_port,
                protocol: Protocol::Udp,
            },
        ],
        network: docker_network_name(&config.network_id),
        ipv4_address: ip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn node(node_type: NodeType) -> BesuNodeConfig {
        BesuNodeConfig::new("n1", node_type)
            .with_ip("172.20.0.11")
            .with_ports(8546, 30304)
    }

    #[test]
    fn test_base_args() {
        let args = besu_args("net", 2025, &node(NodeType::Rpc)).unwrap();
        assert_eq!(args[0], "--data-path=/opt/besu/data");
        assert!(args.contains(&"--network-id=2025".to_string()));
        assert!(args.contains(&"--sync-mode=FULL".to_string()));
        assert!(args.contains(&"--rpc-http-host=0.0.0.0".to_string()));
        assert!(args.contains(&"--rpc-http-port=8546".to_string()));
        assert!(args.contains(&"--p2p-port=30304".to_string()));
        assert!(args.contains(&"--discovery-enabled=true".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--bootnodes")));
        assert!(!args.iter().any(|a| a.starts_with("--miner")));
    }

    #[test]
    fn test_bootnodes_joined() {
        let mut n = node(NodeType::Rpc);
        n.bootnodes = vec!["enode://a@1.1.1.1:30303".to_string(), "enode://b@1.1.1.2:30303".to_string()];
        let args = besu_args("net", 1, &n).unwrap();
        assert!(args.contains(&"--bootnodes=enode://a@1.1.1.1:30303,enode://b@1.1.1.2:30303".to_string()));
    }

    #[test]
    fn test_miner_flags() {
        let n = node(NodeType::Miner).with_coinbase("0xABCDEF0123456789abcdef0123456789ABCDEF01");
        let args = besu_args("net", 1, &n).unwrap();
        let tail = &args[args.len() - 2..];
        assert_eq!(tail[0], "--miner-enabled");
        assert_eq!(tail[1], "--miner-coinbase=0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_miner_without_coinbase_is_invariant_violation() {
        let err = besu_args("net", 1, &node(NodeType::Miner)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_network_spec() {
        let mut config = NetworkConfig::new("devnet", 2025).with_subnet("172.25.0.0/24");
        config.gateway = Some("172.25.0.1".to_string());
        let spec = network_spec(&config).unwrap();
        assert_eq!(spec.name, "besu-devnet");
        assert_eq!(spec.driver, "bridge");
        assert_eq!(spec.labels.get("networkId").map(String::as_str), Some("devnet"));
    }

    #[test]
    fn test_container_spec() {
        let config = NetworkConfig::new("devnet", 2025);
        let paths = BesuPaths::for_node(&PathBuf::from("/ws/networks/devnet"), &PathBuf::from("/ws/networks/devnet/n1"));
        let spec = container_spec(&config, &node(NodeType::Bootnode), "hyperledger/besu:latest", &paths).unwrap();

        assert_eq!(spec.name, "besu-devnet-n1");
        assert_eq!(spec.network, "besu-devnet");
        assert_eq!(spec.ipv4_address, "172.20.0.11");
        assert_eq!(spec.labels["nodeType"], "bootnode");
        assert_eq!(
            spec.binds.iter().map(|b| b.to_bind_string()).collect::<Vec<_>>(),
            vec![
                "/ws/networks/devnet/genesis.json:/opt/besu/genesis.json:ro".to_string(),
                "/ws/networks/devnet/n1/key:/opt/besu/keys/key:ro".to_string(),
            ]
        );
        let keys: Vec<String> = spec.ports.iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["8546/tcp", "30304/tcp", "30304/udp"]);
    }
}
