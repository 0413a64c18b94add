//! ChartClient trait for mocking
//!
//! This trait abstracts chart operations so the controller can be tested
//! without a helm binary or a cluster.

use crate::error::ChartError;
use crate::models::{Release, ReleaseSpec};

/// Trait for chart release operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Dropping a returned future must stop the underlying operation.
#[async_trait::async_trait]
pub trait ChartClientTrait: Send + Sync {
    /// Install the release, or upgrade it if it already exists.
    async fn install(&self, spec: &ReleaseSpec) -> Result<Release, ChartError>;

    /// Remove the release. Returns `ChartError::ReleaseNotFound` if nothing is installed.
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<(), ChartError>;

    /// Current release, `None` if it does not exist.
    async fn status(&self, name: &str, namespace: &str) -> Result<Option<Release>, ChartError>;
}
