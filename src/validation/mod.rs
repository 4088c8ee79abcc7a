//! Pre-flight validation of network and node configurations.
//!
//! Validation never touches Docker state or the store. Every check runs and
//! the violations are reported together in a single
//! [`OrchestratorError::Validation`], unless the caller asked for
//! warnings only. [`apply_defaults`] fills the optional fields of a
//! configuration before it is validated.

pub mod suggestions;

pub use suggestions::{first_free_subnet, suggest_alternatives, PortSuggestions, Suggestions, CANDIDATE_SUBNETS};

use crate::config::{BesuNodeConfig, NetworkConfig, NodeType, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};
use crate::docker::{ContainerRuntime, DockerManager};
use crate::error::{OrchestratorError, Result};
use crate::identity::is_valid_address;
use crate::ip::{
    allocate_ip, generate_ip_pool, network_port_ranges, next_free_port, occupied_ports, port_ranges_overlap, subnets_overlap,
    IpPool, PortRange, Subnet,
};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, LazyLock};

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]{0,62}$").expect("Invalid identifier regex"));

/// Extra check run after the built-in ones; returns additional violations
pub type CustomValidator = Arc<dyn Fn(&NetworkConfig, &[NetworkConfig]) -> Vec<String> + Send + Sync>;

/// Selects which checks [`validate_config`] runs
#[derive(Clone)]
pub struct ValidationOptions {
    pub check_format: bool,
    pub check_existing_id: bool,
    pub check_chain_id: bool,
    pub check_name: bool,
    pub check_subnet: bool,
    pub check_ports: bool,
    /// Look for a Docker network that already carries the derived name
    pub check_docker: bool,
    /// Log violations instead of failing
    pub warnings_only: bool,
    pub custom_validator: Option<CustomValidator>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_format: true,
            check_existing_id: true,
            check_chain_id: true,
            check_name: true,
            check_subnet: true,
            check_ports: true,
            check_docker: true,
            warnings_only: false,
            custom_validator: None,
        }
    }
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("check_format", &self.check_format)
            .field("check_existing_id", &self.check_existing_id)
            .field("check_chain_id", &self.check_chain_id)
            .field("check_name", &self.check_name)
            .field("check_subnet", &self.check_subnet)
            .field("check_ports", &self.check_ports)
            .field("check_docker", &self.check_docker)
            .field("warnings_only", &self.warnings_only)
            .field("custom_validator", &self.custom_validator.is_some())
            .finish()
    }
}

impl ValidationOptions {
    /// Options with the Docker lookup disabled
    pub fn offline() -> Self {
        Self {
            check_docker: false,
            ..Self::default()
        }
    }

    pub fn with_custom_validator(mut self, validator: CustomValidator) -> Self {
        self.custom_validator = Some(validator);
        self
    }
}

/// Whether `id` is usable as a network or node identifier
pub fn is_valid_identifier(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

fn others<'a>(network_id: &'a str, existing: &'a [NetworkConfig]) -> impl Iterator<Item = &'a NetworkConfig> {
    existing.iter().filter(move |n| n.network_id != network_id)
}

fn join_ports(ports: &BTreeSet<u16>) -> String {
    ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

/// Checks on a single node that need no knowledge of its siblings
fn node_violations(node: &BesuNodeConfig, subnet: Option<&Subnet>, gateway: Option<Ipv4Addr>) -> Vec<String> {
    let mut violations = Vec::new();

    if !is_valid_identifier(&node.id) {
        violations.push(format!(
            "Node id '{}' must be lowercase alphanumeric (with '_', '.' or '-') and at most 63 characters",
            node.id
        ));
    }

    if let Some(ip) = node.ip.as_deref() {
        match ip.parse::<Ipv4Addr>() {
            Ok(addr) => {
                if let Some(subnet) = subnet {
                    if !subnet.contains(addr) {
                        violations.push(format!("Node '{}' IP {} is outside subnet {}", node.id, addr, subnet));
                    }
                }
                if gateway == Some(addr) {
                    violations.push(format!("Node '{}' IP {} is the gateway address", node.id, addr));
                }
            }
            Err(_) => violations.push(format!("Node '{}' has an invalid IP address '{}'", node.id, ip)),
        }
    }

    if node.rpc_port == Some(0) {
        violations.push(format!("Node '{}' RPC port must be non-zero", node.id));
    }
    if node.p2p_port == Some(0) {
        violations.push(format!("Node '{}' P2P port must be non-zero", node.id));
    }

    if let Some(coinbase) = node.coinbase.as_deref() {
        if !coinbase.trim().is_empty() && !is_valid_address(coinbase) {
            violations.push(format!("Node '{}' coinbase '{}' is not a 20-byte hex address", node.id, coinbase));
        }
    }

    for bootnode in &node.bootnodes {
        if !bootnode.starts_with("enode://") {
            violations.push(format!("Node '{}' bootnode '{}' is not an enode URL", node.id, bootnode));
        }
    }

    violations
}

/// Basic format checks of a network configuration
pub fn format_violations(config: &NetworkConfig) -> Vec<String> {
    let mut violations = Vec::new();

    if !is_valid_identifier(&config.network_id) {
        violations.push(format!(
            "Network id '{}' must be lowercase alphanumeric (with '_', '.' or '-') and at most 63 characters",
            config.network_id
        ));
    }
    if config.chain_id == 0 {
        violations.push("Chain ID must be a positive integer".to_string());
    }
    if matches!(config.name.as_deref(), Some(name) if name.trim().is_empty()) {
        violations.push("Network name must not be empty".to_string());
    }
    if matches!(config.besu_version.as_deref(), Some(version) if version.trim().is_empty()) {
        violations.push("Besu version must not be empty".to_string());
    }

    let subnet = match config.subnet.as_deref() {
        Some(raw) => match raw.parse::<Subnet>() {
            Ok(subnet) => Some(subnet),
            Err(e) => {
                violations.push(format!("Invalid subnet: {}", e));
                None
            }
        },
        None => {
            violations.push("Subnet is not set".to_string());
            None
        }
    };

    let gateway = match config.gateway.as_deref() {
        Some(raw) => match raw.parse::<Ipv4Addr>() {
            Ok(gateway) => {
                if let Some(subnet) = &subnet {
                    if !subnet.contains(gateway) {
                        violations.push(format!("Gateway {} is outside subnet {}", gateway, subnet));
                    }
                }
                Some(gateway)
            }
            Err(_) => {
                violations.push(format!("Invalid gateway address '{}'", raw));
                None
            }
        },
        None => None,
    };

    let mut ids = HashSet::new();
    let mut ips = HashMap::new();
    let mut ports: HashMap<u16, &str> = HashMap::new();
    for node in &config.nodes {
        violations.extend(node_violations(node, subnet.as_ref(), gateway));

        if !ids.insert(node.id.as_str()) {
            violations.push(format!("Duplicate node id '{}'", node.id));
        }
        if let Some(ip) = node.ip.as_deref() {
            if let Some(previous) = ips.insert(ip, node.id.as_str()) {
                violations.push(format!("Nodes '{}' and '{}' share IP {}", previous, node.id, ip));
            }
        }
        for port in node.host_ports().into_iter().filter(|p| *p != 0) {
            if let Some(previous) = ports.insert(port, node.id.as_str()) {
                violations.push(format!("Port {} is used by both '{}' and '{}'", port, previous, node.id));
            }
        }
    }

    violations
}

/// Conflicts with other tracked networks, as selected by `options`
pub fn conflict_violations(config: &NetworkConfig, options: &ValidationOptions, existing: &[NetworkConfig]) -> Vec<String> {
    let mut violations = Vec::new();

    if options.check_existing_id && existing.iter().any(|n| n.network_id == config.network_id) {
        violations.push(format!("Network '{}' already exists", config.network_id));
    }

    let ranges = network_port_ranges(config);
    for other in others(&config.network_id, existing) {
        if options.check_chain_id && other.chain_id == config.chain_id {
            violations.push(format!(
                "Chain ID {} is already used by network '{}'",
                config.chain_id, other.network_id
            ));
        }
        if options.check_name && other.display_name() == config.display_name() {
            violations.push(format!(
                "Network name '{}' is already used by network '{}'",
                config.display_name(),
                other.network_id
            ));
        }
        if options.check_subnet {
            if let (Some(mine), Some(theirs)) = (config.subnet.as_deref(), other.subnet.as_deref()) {
                if subnets_overlap(mine, theirs) {
                    violations.push(format!(
                        "Subnet {} overlaps subnet {} of network '{}'",
                        mine, theirs, other.network_id
                    ));
                }
            }
        }
        if options.check_ports {
            let shared = shared_ports(&ranges, &network_port_ranges(other));
            if !shared.is_empty() {
                violations.push(format!(
                    "Ports {} are already used by network '{}'",
                    join_ports(&shared),
                    other.network_id
                ));
            }
        }
    }

    violations
}

/// Ports covered by both sets of ranges
fn shared_ports(mine: &[PortRange], theirs: &[PortRange]) -> BTreeSet<u16> {
    let mut shared = BTreeSet::new();
    for a in mine {
        for b in theirs.iter().filter(|b| port_ranges_overlap(a, b)) {
            shared.extend(a.start.max(b.start)..=a.end.min(b.end));
        }
    }
    shared
}

fn static_violations(config: &NetworkConfig, options: &ValidationOptions, existing: &[NetworkConfig]) -> Vec<String> {
    let mut violations = Vec::new();
    if options.check_format {
        violations.extend(format_violations(config));
    }
    violations.extend(conflict_violations(config, options, existing));
    violations
}

fn conclude(network_id: &str, violations: Vec<String>, warnings_only: bool) -> Result<Vec<String>> {
    if violations.is_empty() {
        return Ok(violations);
    }
    if warnings_only {
        for violation in &violations {
            log::warn!("Network {}: {}", network_id, violation);
        }
        return Ok(violations);
    }
    log::debug!("Network {} failed validation with {} violation(s)", network_id, violations.len());
    Err(OrchestratorError::Validation {
        network_id: network_id.to_string(),
        violations,
    })
}

/// Validate a configuration against the tracked networks without Docker.
///
/// Returns the violations downgraded to warnings when `options.warnings_only`
/// is set, an empty list otherwise.
pub fn check_config(config: &NetworkConfig, options: &ValidationOptions, existing: &[NetworkConfig]) -> Result<Vec<String>> {
    let mut violations = static_violations(config, options, existing);
    if let Some(custom) = &options.custom_validator {
        violations.extend(custom(config, existing));
    }
    conclude(&config.network_id, violations, options.warnings_only)
}

/// Validate a configuration against the tracked networks and Docker.
///
/// # Arguments
/// * `config` - Configuration with defaults already applied
/// * `options` - Which checks to run
/// * `existing` - Configurations of every tracked network
/// * `docker` - Used for the Docker network name check when given
///
/// # Returns
/// * `Ok(warnings)` when nothing was violated or `warnings_only` is set
/// * `Err(OrchestratorError::Validation)` listing every violation
pub async fn validate_config<R: ContainerRuntime + ?Sized>(
    config: &NetworkConfig,
    options: &ValidationOptions,
    existing: &[NetworkConfig],
    docker: Option<&DockerManager<R>>,
) -> Result<Vec<String>> {
    let mut violations = static_violations(config, options, existing);

    if options.check_docker {
        if let Some(docker) = docker {
            match docker.docker_network_exists(&config.network_id).await {
                Ok(true) => violations.push(format!(
                    "Docker network '{}' already exists",
                    config.docker_network_name()
                )),
                Ok(false) => {}
                Err(e) => log::warn!("Skipping Docker network check for {}: {}", config.network_id, e),
            }
        }
    }

    if let Some(custom) = &options.custom_validator {
        violations.extend(custom(config, existing));
    }

    conclude(&config.network_id, violations, options.warnings_only)
}

/// Validate a node about to join the tracked network `network`.
pub fn validate_node(network: &NetworkConfig, node: &BesuNodeConfig, existing: &[NetworkConfig]) -> Result<()> {
    let subnet = network.subnet.as_deref().and_then(|s| s.parse::<Subnet>().ok());
    let gateway = network.gateway.as_deref().and_then(|g| g.parse::<Ipv4Addr>().ok());
    let mut violations = node_violations(node, subnet.as_ref(), gateway);

    if network.node(&node.id).is_some() {
        violations.push(format!("Node '{}' already exists in network '{}'", node.id, network.network_id));
    }

    if let Some(ip) = node.ip.as_deref() {
        if let Some(holder) = network.nodes.iter().find(|n| n.ip.as_deref() == Some(ip)) {
            violations.push(format!("IP {} is already assigned to node '{}'", ip, holder.id));
        }
    }

    for port in node.host_ports() {
        if let Some(holder) = network.nodes.iter().find(|n| n.host_ports().contains(&port)) {
            violations.push(format!("Port {} is already used by node '{}'", port, holder.id));
        }
        for other in others(&network.network_id, existing) {
            let requested = PortRange::single(port);
            if network_port_ranges(other).iter().any(|r| port_ranges_overlap(r, &requested)) {
                violations.push(format!("Port {} is already used by network '{}'", port, other.network_id));
            }
        }
    }
    if node.rpc_port.is_some() && node.rpc_port == node.p2p_port {
        violations.push(format!("Node '{}' uses the same port for RPC and P2P", node.id));
    }

    conclude(&network.network_id, violations, false).map(|_| ())
}

/// Structural rules a node must satisfy before anything is provisioned
pub fn check_node_invariants(network_id: &str, node: &BesuNodeConfig) -> Result<()> {
    if node.node_type == NodeType::Miner && node.coinbase.as_deref().map_or(true, |c| c.trim().is_empty()) {
        return Err(OrchestratorError::InvariantViolation {
            network_id: network_id.to_string(),
            node_id: Some(node.id.clone()),
            message: "miner nodes require a coinbase address".to_string(),
        });
    }
    Ok(())
}

/// Hands out addresses and host ports to nodes that did not specify them
struct NodeAllocator {
    network_id: String,
    pool: IpPool,
    taken_ports: BTreeSet<u16>,
}

impl NodeAllocator {
    fn for_network(config: &NetworkConfig, existing: &[NetworkConfig]) -> Self {
        let mut pool = config.subnet.as_deref().map(generate_ip_pool).unwrap_or_default();
        if let Some(gateway) = config.gateway.as_deref().and_then(|g| g.parse::<Ipv4Addr>().ok()) {
            pool.reserve(gateway);
        }
        for ip in config.nodes.iter().filter_map(|n| n.ip.as_deref()?.parse::<Ipv4Addr>().ok()) {
            pool.reserve(ip);
        }

        let other_ranges: Vec<_> = others(&config.network_id, existing)
            .flat_map(network_port_ranges)
            .collect();
        let mut taken_ports = occupied_ports(&other_ranges);
        taken_ports.extend(config.nodes.iter().flat_map(|n| n.host_ports()));

        NodeAllocator {
            network_id: config.network_id.clone(),
            pool,
            taken_ports,
        }
    }

    fn next_port(&mut self, start: u16) -> Result<u16> {
        let port = next_free_port(start, &self.taken_ports).ok_or_else(|| OrchestratorError::Exhaustion {
            network_id: self.network_id.clone(),
            resource: "host port".to_string(),
        })?;
        self.taken_ports.insert(port);
        Ok(port)
    }

    fn fill(&mut self, node: &mut BesuNodeConfig) -> Result<()> {
        if node.ip.is_none() {
            let ip = allocate_ip(&mut self.pool, &self.network_id)?;
            node.ip = Some(ip.to_string());
        }
        if node.rpc_port.is_none() {
            node.rpc_port = Some(self.next_port(DEFAULT_RPC_PORT)?);
        }
        if node.p2p_port.is_none() {
            node.p2p_port = Some(self.next_port(DEFAULT_P2P_PORT)?);
        }
        if node.is_miner() {
            node.mining = true;
        }
        Ok(())
    }
}

/// Fill every optional field of a network configuration.
///
/// Fields the caller set are never changed. Allocated addresses and ports
/// avoid everything already used by `config` itself and by the networks in
/// `existing`.
pub fn apply_defaults(config: &NetworkConfig, existing: &[NetworkConfig], default_besu_version: &str) -> Result<NetworkConfig> {
    let mut config = config.clone();

    if config.name.is_none() {
        config.name = Some(config.network_id.clone());
    }

    if config.subnet.is_none() {
        let taken: Vec<&str> = others(&config.network_id, existing)
            .filter_map(|n| n.subnet.as_deref())
            .collect();
        let subnet = first_free_subnet(taken.iter().copied()).ok_or_else(|| OrchestratorError::Exhaustion {
            network_id: config.network_id.clone(),
            resource: "subnet".to_string(),
        })?;
        log::debug!("Assigned subnet {} to network {}", subnet, config.network_id);
        config.subnet = Some(subnet.to_string());
    }

    if config.gateway.is_none() {
        if let Some(Ok(subnet)) = config.subnet.as_deref().map(str::parse::<Subnet>) {
            config.gateway = Some(subnet.default_gateway().to_string());
        }
    }

    if config.besu_version.is_none() {
        config.besu_version = Some(default_besu_version.to_string());
    }

    if config.nodes.is_empty() {
        config.nodes.push(BesuNodeConfig::new("bootnode", NodeType::Bootnode));
    }

    let mut allocator = NodeAllocator::for_network(&config, existing);
    for node in config.nodes.iter_mut() {
        allocator.fill(node)?;
    }

    Ok(config)
}

/// Fill the ip and ports of a node joining the tracked network `network`
pub fn apply_node_defaults(network: &NetworkConfig, node: &BesuNodeConfig, existing: &[NetworkConfig]) -> Result<BesuNodeConfig> {
    let mut node = node.clone();
    NodeAllocator::for_network(network, existing).fill(&mut node)?;
    Ok(node)
}
