//! Clique genesis document construction.
//!
//! ## extraData layout
//!
//! Clique encodes its initial signer set in the genesis `extraData` field:
//!
//! ```text
//! 0x | 32 zero bytes (vanity) | 20 bytes per signer | 65 zero bytes (seal)
//! ```
//!
//! so the hex string is `2 + 64 + 40 * signers + 130` characters long.

use super::keys::normalize_address;
use crate::config::{
    AllocEntry, GenesisOverrides, DEFAULT_BLOCK_PERIOD, DEFAULT_DIFFICULTY, DEFAULT_EPOCH_LENGTH,
    DEFAULT_GAS_LIMIT, DEFAULT_NODE_BALANCE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const VANITY_HEX_LEN: usize = 64;
const SEAL_HEX_LEN: usize = 130;

/// Clique consensus parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliqueParams {
    #[serde(rename = "blockperiodseconds")]
    pub period: u64,
    #[serde(rename = "epochlength")]
    pub epoch: u64,
    #[serde(rename = "createemptyblocks")]
    pub create_empty_blocks: bool,
}

/// Chain configuration section of a Besu genesis file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSpec {
    pub chain_id: u64,
    pub berlin_block: u64,
    pub london_block: u64,
    pub clique: CliqueParams,
}

/// Genesis document in the shape Besu reads with `--genesis-file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisDocument {
    pub config: ChainSpec,
    pub nonce: String,
    pub timestamp: String,
    pub gas_limit: String,
    pub difficulty: String,
    pub mix_hash: String,
    pub coinbase: String,
    pub extra_data: String,
    pub alloc: BTreeMap<String, AllocEntry>,
}

impl GenesisDocument {
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Signer addresses encoded in `extra_data`
    pub fn signers(&self) -> Vec<String> {
        let body = self.extra_data.trim_start_matches("0x");
        if body.len() < VANITY_HEX_LEN + SEAL_HEX_LEN {
            return Vec::new();
        }
        let signers = &body[VANITY_HEX_LEN..body.len() - SEAL_HEX_LEN];
        signers
            .as_bytes()
            .chunks(40)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Encode a Clique `extraData` for the given signer set
pub fn clique_extra_data(validators: &[String]) -> String {
    let mut extra = String::with_capacity(2 + VANITY_HEX_LEN + 40 * validators.len() + SEAL_HEX_LEN);
    extra.push_str("0x");
    extra.push_str(&"0".repeat(VANITY_HEX_LEN));
    for validator in validators {
        extra.push_str(&normalize_address(validator));
    }
    extra.push_str(&"0".repeat(SEAL_HEX_LEN));
    extra
}

/// Inputs of [`build_genesis`] beyond the chain id and signer set
#[derive(Debug, Clone, PartialEq)]
pub struct GenesisParams {
    pub period: u64,
    pub epoch: u64,
    pub gas_limit: String,
    pub difficulty: String,
    /// Addresses credited with `default_balance`
    pub endowed: Vec<String>,
    pub default_balance: String,
    /// Caller allocations; win over the default endowment
    pub alloc: BTreeMap<String, AllocEntry>,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            period: DEFAULT_BLOCK_PERIOD,
            epoch: DEFAULT_EPOCH_LENGTH,
            gas_limit: DEFAULT_GAS_LIMIT.to_string(),
            difficulty: DEFAULT_DIFFICULTY.to_string(),
            endowed: Vec::new(),
            default_balance: DEFAULT_NODE_BALANCE.to_string(),
            alloc: BTreeMap::new(),
        }
    }
}

impl GenesisParams {
    /// Start from defaults and apply the caller's overrides
    pub fn from_overrides(overrides: Option<&GenesisOverrides>) -> Self {
        let mut params = GenesisParams::default();
        if let Some(o) = overrides {
            if let Some(period) = o.period {
                params.period = period;
            }
            if let Some(epoch) = o.epoch {
                params.epoch = epoch;
            }
            if let Some(gas_limit) = &o.gas_limit {
                params.gas_limit = gas_limit.clone();
            }
            if let Some(difficulty) = &o.difficulty {
                params.difficulty = difficulty.clone();
            }
            if let Some(balance) = &o.default_balance {
                params.default_balance = balance.clone();
            }
            params.alloc = o.alloc.clone();
        }
        params
    }
}

/// Build a Clique genesis document.
///
/// The validator count is not checked: an empty set still produces a
/// well-formed document, just one no node can ever seal a block for.
pub fn build_genesis(chain_id: u64, validators: &[String], params: &GenesisParams) -> GenesisDocument {
    let mut alloc: BTreeMap<String, AllocEntry> = params
        .endowed
        .iter()
        .map(|address| {
            (
                normalize_address(address),
                AllocEntry {
                    balance: params.default_balance.clone(),
                },
            )
        })
        .collect();
    for (address, entry) in &params.alloc {
        alloc.insert(normalize_address(address), entry.clone());
    }

    log::debug!(
        "Building genesis for chain {} with {} signer(s) and {} allocation(s)",
        chain_id,
        validators.len(),
        alloc.len()
    );

    GenesisDocument {
        config: ChainSpec {
            chain_id,
            berlin_block: 0,
            london_block: 0,
            clique: CliqueParams {
                period: params.period,
                epoch: params.epoch,
                create_empty_blocks: true,
            },
        },
        nonce: "0x0".to_string(),
        timestamp: "0x0".to_string(),
        gas_limit: params.gas_limit.clone(),
        difficulty: params.difficulty.clone(),
        mix_hash: format!("0x{}", "0".repeat(64)),
        coinbase: format!("0x{}", "0".repeat(40)),
        extra_data: clique_extra_data(validators),
        alloc,
    }
}
