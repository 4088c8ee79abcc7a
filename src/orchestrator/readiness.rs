//! JSON-RPC readiness probing of Besu nodes.
//!
//! A node counts as ready once `eth_blockNumber` answers and
//! `net_peerCount` reaches the configured minimum. Polling is bounded by a
//! timeout and can be cancelled through a `watch` channel.

use crate::config::ReadinessSettings;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Failure of a single probe request
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Read-only chain queries used to decide readiness
#[async_trait]
pub trait RpcProbe: Send + Sync {
    async fn block_number(&self, endpoint: &str) -> std::result::Result<u64, ProbeError>;

    async fn peer_count(&self, endpoint: &str) -> std::result::Result<u64, ProbeError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

/// Parse a JSON-RPC hex quantity such as `0x1a`
pub fn parse_quantity(value: &str) -> std::result::Result<u64, ProbeError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ProbeError::Decode(format!("'{}' is not a hex quantity", value)))?;
    if digits.is_empty() {
        return Err(ProbeError::Decode(format!("'{}' is not a hex quantity", value)));
    }
    u64::from_str_radix(digits, 16).map_err(|e| ProbeError::Decode(format!("'{}': {}", value, e)))
}

/// [`RpcProbe`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpRpcProbe {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl Default for HttpRpcProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl HttpRpcProbe {
    pub fn new(request_timeout: Duration) -> Self {
        HttpRpcProbe {
            client: reqwest::Client::new(),
            request_timeout,
        }
    }

    async fn call(&self, endpoint: &str, method: &'static str) -> std::result::Result<u64, ProbeError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params: Vec::new(),
        };
        let response = self
            .client
            .post(endpoint)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::Decode(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(ProbeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = body
            .result
            .ok_or_else(|| ProbeError::Decode(format!("{} returned no result", method)))?;
        parse_quantity(&result)
    }
}

#[async_trait]
impl RpcProbe for HttpRpcProbe {
    async fn block_number(&self, endpoint: &str) -> std::result::Result<u64, ProbeError> {
        self.call(endpoint, "eth_blockNumber").await
    }

    async fn peer_count(&self, endpoint: &str) -> std::result::Result<u64, ProbeError> {
        self.call(endpoint, "net_peerCount").await
    }
}

/// Bounds of a readiness wait
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub min_peers: u64,
}

impl From<&ReadinessSettings> for ReadinessOptions {
    fn from(settings: &ReadinessSettings) -> Self {
        ReadinessOptions {
            timeout: settings.timeout,
            poll_interval: settings.poll_interval,
            min_peers: settings.min_peers,
        }
    }
}

/// Chain view of a node at the moment it became ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub node_id: String,
    pub block_number: u64,
    pub peer_count: u64,
    pub attempts: u32,
}

/// Poll `endpoint` until the node is ready, the timeout elapses or `cancel`
/// turns `true`.
///
/// # Arguments
/// * `probe` - RPC client
/// * `endpoint` - `http://host:port` of the node
/// * `network_id`, `node_id` - Used in errors and log lines
/// * `options` - Timeout, poll interval and peer threshold
/// * `cancel` - Cancellation flag; a dropped sender never cancels
pub async fn wait_for_rpc<P: RpcProbe + ?Sized>(
    probe: &P,
    endpoint: &str,
    network_id: &str,
    node_id: &str,
    options: &ReadinessOptions,
    mut cancel: watch::Receiver<bool>,
) -> Result<ReadinessReport> {
    let deadline = Instant::now() + options.timeout;
    let mut attempts = 0u32;
    let mut cancel_open = true;

    loop {
        if *cancel.borrow() {
            return Err(OrchestratorError::Cancelled {
                network_id: network_id.to_string(),
            });
        }

        attempts += 1;
        let last_state = match probe.block_number(endpoint).await {
            Ok(block_number) => match probe.peer_count(endpoint).await {
                Ok(peer_count) if peer_count >= options.min_peers => {
                    info!(
                        "Node {} of network {} is ready at block {} with {} peer(s)",
                        node_id, network_id, block_number, peer_count
                    );
                    return Ok(ReadinessReport {
                        node_id: node_id.to_string(),
                        block_number,
                        peer_count,
                        attempts,
                    });
                }
                Ok(peer_count) => format!(
                    "{} peer(s), waiting for {}",
                    peer_count, options.min_peers
                ),
                Err(e) => format!("net_peerCount: {}", e),
            },
            Err(e) => format!("eth_blockNumber: {}", e),
        };
        debug!("Node {} not ready (attempt {}): {}", node_id, attempts, last_state);

        let now = Instant::now();
        if now >= deadline {
            return Err(OrchestratorError::Readiness {
                network_id: network_id.to_string(),
                node_id: node_id.to_string(),
                message: format!(
                    "not ready after {:?} ({} attempts): {}",
                    options.timeout,
                    attempts,
                    last_state
                ),
            });
        }
        let pause = options.poll_interval.min(deadline - now);

        if cancel_open {
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = cancel.changed() => {
                    if changed.is_err() {
                        cancel_open = false;
                        tokio::time::sleep_until(now + pause).await;
                    }
                }
            }
        } else {
            tokio::time::sleep(pause).await;
        }
    }
}
