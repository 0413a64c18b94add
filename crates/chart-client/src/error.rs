//! Chart client errors

use thiserror::Error;

/// Errors that can occur when installing or removing a chart release
#[derive(Debug, Error)]
pub enum ChartError {
    /// The helm binary could not be spawned or its output could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// helm exited with a non-zero status
    #[error("helm {command} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// helm sub-command, e.g. "upgrade"
        command: String,
        /// Process exit code, `None` if killed by a signal
        code: Option<i32>,
        /// Trimmed standard error
        stderr: String,
    },

    /// No release with that name exists in the namespace
    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    /// helm reported the release in a non-deployed state after install
    #[error("Release {name} ended in state {status}")]
    ReleaseFailed {
        /// Release name
        name: String,
        /// Status reported by helm
        status: String,
    },

    /// The release request was rejected before calling helm
    #[error("Invalid release: {0}")]
    InvalidRelease(String),

    /// helm JSON output could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChartError {
    /// Whether helm reported that the release does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            ChartError::ReleaseNotFound(_) => true,
            ChartError::CommandFailed { stderr, .. } => {
                stderr.to_lowercase().contains("release: not found")
            }
            _ => false,
        }
    }
}
