//! Controller-specific error types.
//!
//! This module defines the errors a reconcile pass can end with, plus the
//! startup errors of the binary.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the CFAPI Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object no longer exists
    #[error("CFAPI not found: {0}")]
    NotFound(String),

    /// Write rejected because the stored resourceVersion moved on
    #[error("Conflict writing CFAPI {0}")]
    Conflict(String),

    /// Workload install/upgrade failed
    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    /// Workload uninstall failed
    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    /// Finalizer could not be written
    #[error("Finalizer write failed: {0}")]
    FinalizerWriteFailed(String),

    /// Status could not be written
    #[error("Status write failed: {0}")]
    StatusWriteFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Controller is shutting down
    #[error("Reconcile cancelled by shutdown")]
    Cancelled,

    /// Metric registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics/probe server failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl ControllerError {
    /// Stable label for the `error` dimension of the error counter.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            ControllerError::Kube(_) => "kube",
            ControllerError::NotFound(_) => "not_found",
            ControllerError::Conflict(_) => "conflict",
            ControllerError::ApplyFailed(_) => "apply_failed",
            ControllerError::TeardownFailed(_) => "teardown_failed",
            ControllerError::FinalizerWriteFailed(_) => "finalizer_write_failed",
            ControllerError::StatusWriteFailed(_) => "status_write_failed",
            ControllerError::InvalidConfig(_) => "invalid_config",
            ControllerError::Cancelled => "cancelled",
            ControllerError::Metrics(_) => "metrics",
            ControllerError::Server(_) => "server",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels_are_snake_case() {
        let errors = [
            ControllerError::NotFound("default/cfapi".to_string()),
            ControllerError::Conflict("default/cfapi".to_string()),
            ControllerError::ApplyFailed("boom".to_string()),
            ControllerError::TeardownFailed("boom".to_string()),
            ControllerError::Cancelled,
        ];
        for err in &errors {
            let label = err.metric_label();
            assert!(label.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{label}");
        }
    }
}
