mod common;

use async_trait::async_trait;
use besunet::config::{BesuNodeConfig, NetworkConfig, NodeType, OrchestratorSettings};
use besunet::docker::LABEL_NODE_TYPE;
use besunet::error::ErrorKind;
use besunet::identity::GenesisDocument;
use besunet::orchestrator::readiness::{ProbeError, RpcProbe};
use besunet::store::{NetworkState, NetworkStore};
use common::{manager, manager_with, three_node_network, COINBASE};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let prefix = format!("{}=", flag);
    args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
}

#[tokio::test]
async fn test_create_network_provisions_every_node() {
    let (manager, runtime, store) = manager();
    let info = manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    assert_eq!(info.state, NetworkState::Active);
    assert_eq!(info.containers.len(), 3);
    assert_eq!(info.gateway, "172.30.0.1");
    assert_eq!(runtime.network_names(), vec!["besu-devnet".to_string()]);
    assert_eq!(runtime.count("create_container"), 3);
    assert_eq!(runtime.count("start_container"), 3);
    assert_eq!(runtime.count("pull_image"), 1);

    let spec = &runtime.network_specs()[0];
    assert_eq!(spec.subnet, "172.30.0.0/24");
    assert_eq!(spec.gateway, "172.30.0.1");

    let enode_re = Regex::new(r"^enode://[0-9a-f]{128}@172\.30\.0\.10:30303$").unwrap();
    let boot = store.load_credentials("devnet", "boot").unwrap().unwrap();
    assert!(enode_re.is_match(&boot.enode), "bad enode {}", boot.enode);

    let boot_container = runtime.container_named("besu-devnet-boot").unwrap();
    assert!(boot_container.running);
    assert_eq!(boot_container.spec.image, "hyperledger/besu:latest");
    assert_eq!(boot_container.spec.ipv4_address, "172.30.0.10");
    assert!(arg_value(&boot_container.spec.args, "--bootnodes").is_none());

    let rpc = runtime.container_named("besu-devnet-rpc-1").unwrap();
    assert_eq!(arg_value(&rpc.spec.args, "--bootnodes"), Some(boot.enode.as_str()));
    assert_eq!(arg_value(&rpc.spec.args, "--network-id"), Some("1337"));
    assert_eq!(arg_value(&rpc.spec.args, "--rpc-http-port"), Some("8547"));
    assert!(!rpc.spec.args.iter().any(|a| a == "--miner-enabled"));

    let miner = runtime.container_named("besu-devnet-miner-1").unwrap();
    assert!(miner.spec.args.iter().any(|a| a == "--miner-enabled"));
    assert_eq!(arg_value(&miner.spec.args, "--miner-coinbase"), Some(COINBASE));
    assert_eq!(miner.spec.labels.get(LABEL_NODE_TYPE).map(String::as_str), Some("miner"));
}

#[tokio::test]
async fn test_genesis_signers_and_endowments() {
    let (manager, _runtime, store) = manager();
    let info = manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    let genesis: GenesisDocument = serde_json::from_value(store.genesis("devnet").unwrap()).unwrap();
    assert_eq!(genesis.chain_id(), 1337);

    let miner_address = info.node("miner-1").unwrap().address.clone().unwrap();
    assert_eq!(genesis.signers(), vec![miner_address]);
    assert_eq!(genesis.extra_data.len(), 2 + 64 + 40 + 130);
    assert_eq!(genesis.alloc.len(), 3);
    for node in &info.config.nodes {
        assert!(genesis.alloc.contains_key(node.address.as_deref().unwrap()));
    }
}

#[tokio::test]
async fn test_supplied_genesis_is_written_verbatim() {
    let (manager, _runtime, store) = manager();
    let supplied = serde_json::json!({"config": {"chainId": 99}, "extraData": "0x00"});
    let mut config = three_node_network("custom", 99, "172.30.0.0/24");
    config.genesis = Some(supplied.clone());

    manager.create_network(config).await.unwrap();
    assert_eq!(store.genesis("custom"), Some(supplied));
}

#[tokio::test]
async fn test_defaults_fill_empty_network() {
    let (manager, runtime, _store) = manager();
    let info = manager.create_network(NetworkConfig::new("tiny", 42)).await.unwrap();

    assert_eq!(info.subnet, "172.20.0.0/24");
    assert_eq!(info.config.nodes.len(), 1);
    assert_eq!(info.config.nodes[0].node_type, NodeType::Bootnode);
    assert!(runtime.container_named("besu-tiny-bootnode").is_some());
}

#[tokio::test]
async fn test_duplicate_chain_id_rejected() {
    let (manager, runtime, store) = manager();
    manager
        .create_network(three_node_network("a", 2025, "172.30.0.0/24"))
        .await
        .unwrap();
    let containers_before = runtime.containers().len();

    let err = manager
        .create_network(three_node_network("b", 2025, "172.31.0.0/24"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let text = err.to_string();
    assert!(text.contains("2025"));
    assert!(text.contains("'a'"));
    assert!(store.get_network("b").unwrap().is_none());
    assert_eq!(runtime.containers().len(), containers_before);

    let suggestions = manager
        .suggest_alternatives(&three_node_network("b", 2025, "172.30.0.0/24"))
        .unwrap();
    assert_eq!(suggestions.chain_ids[0], 2026);
    assert!(!suggestions.subnets.contains(&"172.30.0.0/24".to_string()));
    assert_eq!(suggestions.ports.rpc.len(), 3);
}

#[tokio::test]
async fn test_overlapping_subnet_rejected() {
    let (manager, _runtime, _store) = manager();

    // Explicit ips, since /16 subnets have no address pool
    let mut wide = NetworkConfig::new("wide", 1).with_subnet("172.25.0.0/16");
    wide.nodes.push(BesuNodeConfig::new("boot", NodeType::Bootnode).with_ip("172.25.0.10"));
    manager.create_network(wide).await.unwrap();

    let err = manager
        .create_network(NetworkConfig::new("narrow", 2).with_subnet("172.25.128.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.violations().iter().any(|v| v.contains("overlaps")));
}

#[tokio::test]
async fn test_miner_without_coinbase_touches_nothing() {
    let (manager, runtime, store) = manager();
    let config = NetworkConfig::new("bad", 7)
        .with_subnet("172.30.0.0/24")
        .with_node(BesuNodeConfig::new("miner-1", NodeType::Miner));

    let err = manager.create_network(config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(err.node_id(), Some("miner-1"));
    assert_eq!(runtime.call_count(), 0);
    assert!(store.list_networks().unwrap().is_empty());
}

#[tokio::test]
async fn test_existing_docker_network_rejected() {
    let (manager, runtime, _store) = manager();
    runtime.add_foreign_network("besu-taken");

    let err = manager.create_network(NetworkConfig::new("taken", 5)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err
        .violations()
        .iter()
        .any(|v| v.contains("Docker network 'besu-taken'")));
}

#[tokio::test]
async fn test_concurrent_creates_cannot_share_a_chain_id() {
    let (manager, _runtime, store) = manager();
    let (first, second) = tokio::join!(
        manager.create_network(three_node_network("left", 500, "172.30.0.0/24")),
        manager.create_network(three_node_network("right", 500, "172.31.0.0/24")),
    );

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    let loser = first.err().or(second.err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::Validation);
    assert_eq!(store.list_networks().unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_node_to_missing_network() {
    let (manager, runtime, _store) = manager();
    let err = manager
        .add_node("missing-network", BesuNodeConfig::new("rpc-9", NodeType::Rpc))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.network_id(), Some("missing-network"));
    assert_eq!(runtime.call_count(), 0);
}

#[tokio::test]
async fn test_add_node_joins_with_bootnodes() {
    let (manager, runtime, store) = manager();
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    let container = manager
        .add_node("devnet", BesuNodeConfig::new("rpc-2", NodeType::Rpc))
        .await
        .unwrap();
    assert_eq!(container.container_name, "besu-devnet-rpc-2");

    let info = store.get_network("devnet").unwrap().unwrap();
    let node = info.node("rpc-2").unwrap();
    assert_eq!(node.ip.as_deref(), Some("172.30.0.13"));
    assert_eq!(node.host_ports(), vec![8548, 30306]);
    assert!(info.containers.contains_key("rpc-2"));

    let boot = store.load_credentials("devnet", "boot").unwrap().unwrap();
    let spec = runtime.container_named("besu-devnet-rpc-2").unwrap().spec;
    assert_eq!(arg_value(&spec.args, "--bootnodes"), Some(boot.enode.as_str()));

    let err = manager
        .add_node("devnet", BesuNodeConfig::new("rpc-2", NodeType::Rpc))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_add_node_port_conflict_with_other_network() {
    let (manager, _runtime, _store) = manager();
    manager
        .create_network(three_node_network("a", 1, "172.30.0.0/24"))
        .await
        .unwrap();
    manager
        .create_network(three_node_network("b", 2, "172.31.0.0/24"))
        .await
        .unwrap();

    let err = manager
        .add_node("b", BesuNodeConfig::new("rpc-2", NodeType::Rpc).with_ports(8545, 30999))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err
        .violations()
        .iter()
        .any(|v| v == "Port 8545 is already used by network 'a'"));
}

#[tokio::test]
async fn test_add_miner_without_coinbase() {
    let (manager, runtime, _store) = manager();
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();
    let calls = runtime.call_count();

    let err = manager
        .add_node("devnet", BesuNodeConfig::new("miner-2", NodeType::Miner))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(runtime.call_count(), calls);
}

#[tokio::test]
async fn test_remove_node() {
    let (manager, runtime, store) = manager();
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    manager.remove_node("devnet", "rpc-1").await.unwrap();
    assert!(runtime.container_named("besu-devnet-rpc-1").is_none());
    assert!(store.load_credentials("devnet", "rpc-1").unwrap().is_none());
    let info = store.get_network("devnet").unwrap().unwrap();
    assert!(info.node("rpc-1").is_none());
    assert!(!info.containers.contains_key("rpc-1"));

    let err = manager.remove_node("devnet", "rpc-1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.node_id(), Some("rpc-1"));
}

#[tokio::test]
async fn test_stop_network_is_idempotent() {
    let (manager, runtime, store) = manager();
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    let report = manager.stop_network("devnet").await.unwrap();
    assert!(report.was_tracked);
    assert_eq!(report.containers_removed, 3);
    assert_eq!(report.docker_networks_removed, 1);
    assert!(runtime.containers().is_empty());
    assert!(runtime.network_names().is_empty());
    assert!(store.get_network("devnet").unwrap().is_none());

    let again = manager.stop_network("devnet").await.unwrap();
    assert!(!again.was_tracked);
    assert_eq!(again.containers_removed, 0);
    assert_eq!(again.docker_networks_removed, 0);
}

#[tokio::test]
async fn test_stop_untracked_network_removes_leftovers() {
    let (manager, runtime, _store) = manager();
    runtime.add_foreign_network("besu-ghost");

    let report = manager.stop_network("ghost").await.unwrap();
    assert!(!report.was_tracked);
    assert_eq!(report.docker_networks_removed, 1);
    assert!(runtime.network_names().is_empty());
}

#[tokio::test]
async fn test_failed_create_is_rolled_back() {
    let (manager, runtime, store) = manager();
    runtime.fail("start_container");

    let err = manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DockerOperation);
    assert_eq!(err.node_id(), Some("boot"));

    assert!(store.get_network("devnet").unwrap().is_none());
    assert!(store.genesis("devnet").is_none());
    assert!(runtime.containers().is_empty());
    assert!(runtime.network_names().is_empty());
    assert!(manager.list_networks().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_create_without_rollback_stays_reserved() {
    let settings = OrchestratorSettings {
        rollback_on_failure: false,
        ..OrchestratorSettings::default()
    };
    let (manager, runtime, store) = manager_with(settings);
    runtime.fail("create_network");

    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap_err();
    let info = store.get_network("devnet").unwrap().unwrap();
    assert_eq!(info.state, NetworkState::Creating);

    manager.stop_network("devnet").await.unwrap();
    assert!(store.get_network("devnet").unwrap().is_none());
}

#[tokio::test]
async fn test_node_status() {
    let (manager, runtime, store) = manager();
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    let status = manager.get_node_status("devnet", "miner-1").await.unwrap();
    let credentials = store.load_credentials("devnet", "miner-1").unwrap().unwrap();
    assert_eq!(status.node_type, NodeType::Miner);
    assert!(status.running);
    assert_eq!(status.state, "running");
    assert_eq!(status.enode.as_deref(), Some(credentials.enode.as_str()));
    assert_eq!(status.address.as_deref(), Some(credentials.address.as_str()));
    assert_eq!(status.ports.len(), 3);

    runtime.forget_container(status.container_id.as_deref().unwrap());
    let status = manager.get_node_status("devnet", "miner-1").await.unwrap();
    assert_eq!(status.state, "missing");
    assert!(!status.running);

    let err = manager.get_node_status("devnet", "nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

struct ReadyProbe;

#[async_trait]
impl RpcProbe for ReadyProbe {
    async fn block_number(&self, endpoint: &str) -> Result<u64, ProbeError> {
        if endpoint.ends_with(":8545") {
            Ok(12)
        } else {
            Err(ProbeError::Transport("connection refused".to_string()))
        }
    }

    async fn peer_count(&self, _endpoint: &str) -> Result<u64, ProbeError> {
        Ok(2)
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_ready() {
    let mut settings = OrchestratorSettings::default();
    settings.readiness.timeout = Duration::from_secs(5);
    let (manager, _runtime, _store) = manager_with(settings);
    let manager = manager.with_probe(Arc::new(ReadyProbe));
    manager
        .create_network(three_node_network("devnet", 1337, "172.30.0.0/24"))
        .await
        .unwrap();

    let (_tx, rx) = watch::channel(false);
    let report = manager.wait_until_ready("devnet", "boot", rx.clone()).await.unwrap();
    assert_eq!(report.block_number, 12);
    assert_eq!(report.peer_count, 2);

    let err = manager.wait_until_ready("devnet", "rpc-1", rx.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Readiness);

    let err = manager.wait_until_ready("devnet", "ghost", rx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
