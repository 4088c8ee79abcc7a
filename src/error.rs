//! Error taxonomy for network provisioning.
//!
//! Every failure surfaced by the orchestrator is an [`OrchestratorError`].
//! Callers that need to branch on the failure class use [`OrchestratorError::kind`]
//! together with the `network_id`/`node_id` accessors instead of matching on
//! message text.

use crate::docker::RuntimeError;
use std::path::PathBuf;

/// Coarse classification of an [`OrchestratorError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    DockerOperation,
    Exhaustion,
    InvariantViolation,
    Storage,
    Serialization,
    Readiness,
    Cancelled,
}

/// Errors produced by the orchestrator and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Pre-flight validation failed; no state was touched
    #[error("Validation failed for network '{network_id}':\n{}", format_violations(.violations))]
    Validation {
        network_id: String,
        violations: Vec<String>,
    },

    #[error("{}", describe_not_found(.network_id, .node_id.as_deref()))]
    NotFound {
        network_id: String,
        node_id: Option<String>,
    },

    #[error("Docker operation '{operation}' failed{}: {source}", describe_scope(.network_id.as_deref(), .node_id.as_deref()))]
    DockerOperation {
        operation: String,
        network_id: Option<String>,
        node_id: Option<String>,
        #[source]
        source: RuntimeError,
    },

    #[error("No free {resource} left for network '{network_id}'")]
    Exhaustion { network_id: String, resource: String },

    #[error("Invariant violated{}: {message}", describe_scope(Some(.network_id.as_str()), .node_id.as_deref()))]
    InvariantViolation {
        network_id: String,
        node_id: Option<String>,
        message: String,
    },

    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error for {context}: {message}")]
    Serialization { context: String, message: String },

    #[error("Node '{node_id}' in network '{network_id}' is not ready: {message}")]
    Readiness {
        network_id: String,
        node_id: String,
        message: String,
    },

    #[error("Operation on network '{network_id}' was cancelled")]
    Cancelled { network_id: String },
}

fn format_violations(violations: &[String]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_not_found(network_id: &str, node_id: Option<&str>) -> String {
    match node_id {
        Some(node) => format!("Node '{}' not found in network '{}'", node, network_id),
        None => format!("Network '{}' not found", network_id),
    }
}

fn describe_scope(network_id: Option<&str>, node_id: Option<&str>) -> String {
    match (network_id, node_id) {
        (Some(net), Some(node)) => format!(" (network '{}', node '{}')", net, node),
        (Some(net), None) => format!(" (network '{}')", net),
        (None, Some(node)) => format!(" (node '{}')", node),
        (None, None) => String::new(),
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Validation { .. } => ErrorKind::Validation,
            OrchestratorError::NotFound { .. } => ErrorKind::NotFound,
            OrchestratorError::DockerOperation { .. } => ErrorKind::DockerOperation,
            OrchestratorError::Exhaustion { .. } => ErrorKind::Exhaustion,
            OrchestratorError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            OrchestratorError::Storage { .. } => ErrorKind::Storage,
            OrchestratorError::Serialization { .. } => ErrorKind::Serialization,
            OrchestratorError::Readiness { .. } => ErrorKind::Readiness,
            OrchestratorError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Network the error refers to, when it is scoped to one
    pub fn network_id(&self) -> Option<&str> {
        match self {
            OrchestratorError::Validation { network_id, .. }
            | OrchestratorError::NotFound { network_id, .. }
            | OrchestratorError::Exhaustion { network_id, .. }
            | OrchestratorError::InvariantViolation { network_id, .. }
            | OrchestratorError::Readiness { network_id, .. }
            | OrchestratorError::Cancelled { network_id } => Some(network_id),
            OrchestratorError::DockerOperation { network_id, .. } => network_id.as_deref(),
            OrchestratorError::Storage { .. } | OrchestratorError::Serialization { .. } => None,
        }
    }

    /// Node the error refers to, when it is scoped to one
    pub fn node_id(&self) -> Option<&str> {
        match self {
            OrchestratorError::NotFound { node_id, .. }
            | OrchestratorError::DockerOperation { node_id, .. }
            | OrchestratorError::InvariantViolation { node_id, .. } => node_id.as_deref(),
            OrchestratorError::Readiness { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Violations carried by a validation error (empty for other kinds)
    pub fn violations(&self) -> &[String] {
        match self {
            OrchestratorError::Validation { violations, .. } => violations,
            _ => &[],
        }
    }

    pub(crate) fn network_not_found(network_id: &str) -> Self {
        OrchestratorError::NotFound {
            network_id: network_id.to_string(),
            node_id: None,
        }
    }

    pub(crate) fn node_not_found(network_id: &str, node_id: &str) -> Self {
        OrchestratorError::NotFound {
            network_id: network_id.to_string(),
            node_id: Some(node_id.to_string()),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OrchestratorError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        OrchestratorError::Serialization {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
