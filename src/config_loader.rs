//! Loading of network, node and settings files.
//!
//! The format is chosen by extension: `.yaml`/`.yml` through `serde_yaml`,
//! `.json` through `serde_json`. Keys are camelCase in both.

use crate::config::{BesuNodeConfig, ConfigError, NetworkConfig, OrchestratorSettings};
use log::info;
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = format_of(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed = match format {
        Format::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

/// Load a network configuration
pub fn load_network_config(path: &Path) -> Result<NetworkConfig, ConfigError> {
    info!("Loading network configuration from: {:?}", path);
    let config: NetworkConfig = load(path)?;
    info!(
        "Network {} (chain id {}) declares {} node(s)",
        config.network_id,
        config.chain_id,
        config.nodes.len()
    );
    Ok(config)
}

/// Load a single node configuration (for `add-node`)
pub fn load_node_config(path: &Path) -> Result<BesuNodeConfig, ConfigError> {
    info!("Loading node configuration from: {:?}", path);
    load(path)
}

/// Load orchestrator settings; defaults when no file is given
pub fn load_settings(path: Option<&Path>) -> Result<OrchestratorSettings, ConfigError> {
    match path {
        Some(path) => {
            info!("Loading settings from: {:?}", path);
            load(path)
        }
        None => Ok(OrchestratorSettings::default()),
    }
}
