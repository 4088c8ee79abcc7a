//! Alternatives offered when a network configuration is rejected.

use crate::config::{NetworkConfig, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};
use crate::ip::{network_port_ranges, next_free_port, occupied_ports, subnets_overlap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Subnets tried, in order, when suggesting or defaulting a subnet.
/// All are `/24` so node addresses can be pooled.
pub const CANDIDATE_SUBNETS: &[&str] = &[
    "172.20.0.0/24",
    "172.21.0.0/24",
    "172.22.0.0/24",
    "172.23.0.0/24",
    "172.24.0.0/24",
    "172.25.0.0/24",
    "172.26.0.0/24",
    "172.27.0.0/24",
    "172.28.0.0/24",
    "172.29.0.0/24",
    "10.100.0.0/24",
    "10.101.0.0/24",
    "10.102.0.0/24",
    "10.103.0.0/24",
    "192.168.100.0/24",
    "192.168.101.0/24",
];

const MAX_CHAIN_IDS: usize = 5;
const MAX_SUBNETS: usize = 5;
const MAX_NAMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortSuggestions {
    pub rpc: Vec<u16>,
    pub p2p: Vec<u16>,
}

/// Unused values a caller can retry with
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub chain_ids: Vec<u64>,
    pub subnets: Vec<String>,
    pub names: Vec<String>,
    pub ports: PortSuggestions,
}

/// First candidate subnet that overlaps none of the given subnets
pub fn first_free_subnet<'a>(taken: impl IntoIterator<Item = &'a str> + Clone) -> Option<&'static str> {
    CANDIDATE_SUBNETS
        .iter()
        .copied()
        .find(|candidate| !taken.clone().into_iter().any(|t| subnets_overlap(candidate, t)))
}

fn others<'a>(config: &'a NetworkConfig, existing: &'a [NetworkConfig]) -> impl Iterator<Item = &'a NetworkConfig> + Clone {
    existing.iter().filter(move |n| n.network_id != config.network_id)
}

/// Compute alternatives for every dimension a configuration can collide on.
///
/// # Arguments
/// * `config` - The rejected configuration
/// * `existing` - Configurations of every tracked network
pub fn suggest_alternatives(config: &NetworkConfig, existing: &[NetworkConfig]) -> Suggestions {
    let others: Vec<&NetworkConfig> = others(config, existing).collect();

    let used_chain_ids: HashSet<u64> = others.iter().map(|n| n.chain_id).collect();
    let chain_ids = (config.chain_id.saturating_add(1)..=u64::MAX)
        .filter(|id| !used_chain_ids.contains(id))
        .take(MAX_CHAIN_IDS)
        .collect();

    let taken_subnets: Vec<&str> = others.iter().filter_map(|n| n.subnet.as_deref()).collect();
    let subnets = CANDIDATE_SUBNETS
        .iter()
        .filter(|candidate| !taken_subnets.iter().any(|t| subnets_overlap(candidate, t)))
        .take(MAX_SUBNETS)
        .map(|s| s.to_string())
        .collect();

    let used_names: HashSet<&str> = others
        .iter()
        .flat_map(|n| [n.display_name(), n.network_id.as_str()])
        .collect();
    let base = config.display_name();
    let names = (2..)
        .map(|i| format!("{}-{}", base, i))
        .filter(|name| !used_names.contains(name.as_str()))
        .take(MAX_NAMES)
        .collect();

    let ranges: Vec<_> = others.iter().flat_map(|n| network_port_ranges(n)).collect();
    let mut taken: BTreeSet<u16> = occupied_ports(&ranges);
    let wanted = config.nodes.len().max(1);
    let mut rpc = Vec::with_capacity(wanted);
    let mut p2p = Vec::with_capacity(wanted);
    for i in 0..wanted {
        let node = config.nodes.get(i);
        let rpc_start = node.and_then(|n| n.rpc_port).unwrap_or(DEFAULT_RPC_PORT);
        if let Some(port) = next_free_port(rpc_start, &taken) {
            taken.insert(port);
            rpc.push(port);
        }
        let p2p_start = node.and_then(|n| n.p2p_port).unwrap_or(DEFAULT_P2P_PORT);
        if let Some(port) = next_free_port(p2p_start, &taken) {
            taken.insert(port);
            p2p.push(port);
        }
    }

    Suggestions {
        chain_ids,
        subnets,
        names,
        ports: PortSuggestions { rpc, p2p },
    }
}
