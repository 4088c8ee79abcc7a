//! Host port footprint of a network.

use crate::config::{NetworkConfig, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};
use std::collections::BTreeSet;

/// Inclusive range of host ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        PortRange { start: port, end: port }
    }
}

/// Ports a network occupies on the host, one degenerate range per port.
///
/// A network that declares no nodes is accounted with the default bootnode
/// ports, since a bootnode on those ports is what it will get.
pub fn network_port_ranges(config: &NetworkConfig) -> Vec<PortRange> {
    if config.nodes.is_empty() {
        return vec![
            PortRange::single(DEFAULT_RPC_PORT),
            PortRange::single(DEFAULT_P2P_PORT),
        ];
    }
    config
        .nodes
        .iter()
        .flat_map(|node| node.host_ports())
        .map(PortRange::single)
        .collect()
}

/// Integer interval intersection
pub fn port_ranges_overlap(a: &PortRange, b: &PortRange) -> bool {
    a.start <= b.end && b.start <= a.end
}

/// Flattened set of every port covered by the given ranges
pub fn occupied_ports<'a>(ranges: impl IntoIterator<Item = &'a PortRange>) -> BTreeSet<u16> {
    ranges
        .into_iter()
        .flat_map(|r| r.start..=r.end)
        .collect()
}

/// First port at or above `start` that is not in `taken`
pub fn next_free_port(start: u16, taken: &BTreeSet<u16>) -> Option<u16> {
    (start..=u16::MAX).find(|port| !taken.contains(port))
}
