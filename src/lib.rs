//! # besunet - Provisioning utility for private Besu networks on Docker
//!
//! This library creates, extends and tears down private Hyperledger Besu
//! networks running Clique proof-of-authority, each node in its own Docker
//! container on a dedicated bridge network.
//!
//! ## Overview
//!
//! Several networks can live side by side on one host. Before anything is
//! created, a requested network is checked against every network already
//! tracked: chain ids, display names, subnets and host ports must not collide.
//! When they do, the caller gets every violation at once together with
//! suggested alternatives.
//!
//! ## Architecture
//!
//! - `config`: network, node and orchestrator settings types
//! - `config_loader`: YAML/JSON file loading
//! - `identity`: secp256k1 node identities, enode URLs, Clique genesis
//! - `ip`: CIDR arithmetic, `/24` address pools, host port footprints
//! - `validation`: defaults, pre-flight validation, suggestions
//! - `docker`: the `ContainerRuntime` trait, its bollard implementation and
//!   the provisioning operations on top of it
//! - `store`: tracked networks and node key material (in memory or on disk)
//! - `orchestrator`: the `NetworkManager` lifecycle and readiness probing
//! - `error`: the `OrchestratorError` taxonomy
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use besunet::config::{BesuNodeConfig, NetworkConfig, NodeType, OrchestratorSettings};
//! use besunet::docker::BollardRuntime;
//! use besunet::orchestrator::NetworkManager;
//! use besunet::store::FsStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = OrchestratorSettings::default();
//! let store = Arc::new(FsStore::new(settings.networks_dir()));
//! let runtime = Arc::new(BollardRuntime::connect_local()?);
//! let manager = NetworkManager::new(settings, runtime, store);
//!
//! let config = NetworkConfig::new("devnet", 1337)
//!     .with_node(BesuNodeConfig::new("boot", NodeType::Bootnode))
//!     .with_node(
//!         BesuNodeConfig::new("miner-1", NodeType::Miner)
//!             .with_coinbase("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"),
//!     );
//! let network = manager.create_network(config).await?;
//! println!("{} is {:?}", network.network_id, network.state);
//!
//! manager.stop_network("devnet").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library functions return `besunet::error::Result`, whose error type
//! carries a kind plus the network and node it concerns. The `besunet`
//! binary reports errors through `color_eyre`.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod identity;
pub mod ip;
pub mod validation;
pub mod docker;
pub mod store;
pub mod orchestrator;

pub use error::{ErrorKind, OrchestratorError, Result};
