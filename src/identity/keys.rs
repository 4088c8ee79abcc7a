//! secp256k1 node identities.
//!
//! A node identity is a secp256k1 keypair plus everything Besu and its peers
//! derive from it: the Ethereum account address and the enode URL. All hex
//! is lowercase without a `0x` prefix, which is also how it is persisted.

use crate::error::{OrchestratorError, Result};
use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Discovery port written into every enode URL
pub const ENODE_DISCOVERY_PORT: u16 = 30303;

/// Key material and derived identifiers of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCredentials {
    /// 32-byte secret key, 64 hex chars
    pub private_key: String,
    /// Uncompressed public key without the `04` tag, 128 hex chars
    pub public_key: String,
    /// 20-byte account address, 40 hex chars
    pub address: String,
    /// `enode://<public_key>@<ip>:30303`
    pub enode: String,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Public key bytes without the leading `0x04` tag
fn public_key_body(public_key: &PublicKey) -> [u8; 64] {
    let uncompressed = public_key.serialize_uncompressed();
    let mut body = [0u8; 64];
    body.copy_from_slice(&uncompressed[1..]);
    body
}

/// Last 20 bytes of keccak256 over the untagged public key
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let hash = keccak256(&public_key_body(public_key));
    hex::encode(&hash[12..])
}

pub fn enode_url(public_key_hex: &str, ip: &str) -> String {
    format!("enode://{}@{}:{}", public_key_hex, ip, ENODE_DISCOVERY_PORT)
}

fn credentials_from_secret(secret_key: &SecretKey, ip: &str) -> NodeCredentials {
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_secret_key(&secp, secret_key);
    let public_key_hex = hex::encode(public_key_body(&public_key));

    NodeCredentials {
        private_key: hex::encode(secret_key.secret_bytes()),
        address: address_from_public_key(&public_key),
        enode: enode_url(&public_key_hex, ip),
        public_key: public_key_hex,
    }
}

/// Generate a fresh identity for a node reachable at `ip`.
///
/// The enode always advertises port 30303, whatever p2p port the node is
/// configured with.
pub fn generate_identity(ip: &str) -> NodeCredentials {
    let secp = Secp256k1::new();
    let (secret_key, _) = secp.generate_keypair(&mut OsRng);
    credentials_from_secret(&secret_key, ip)
}

/// Re-derive credentials from a persisted private key (hex, optional `0x`)
pub fn credentials_from_private_key(private_key: &str, ip: &str) -> Result<NodeCredentials> {
    let trimmed = private_key.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(trimmed)
        .map_err(|e| OrchestratorError::serialization("node private key", e))?;
    let secret_key = SecretKey::from_slice(&bytes)
        .map_err(|e| OrchestratorError::serialization("node private key", e))?;
    Ok(credentials_from_secret(&secret_key, ip))
}

/// Strip an optional `0x` prefix and lowercase an address
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_lowercase()
}

/// Whether `address` is 20 bytes of hex (with or without `0x`)
pub fn is_valid_address(address: &str) -> bool {
    let body = normalize_address(address);
    body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
}
