//! Chart release models

use crate::error::ChartError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Helm limits release names to 53 characters.
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Desired release: what to install and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    /// Release name
    pub name: String,
    /// Namespace the release is installed into
    pub namespace: String,
    /// Chart reference (path, `repo/chart` or OCI URL)
    pub chart: String,
    /// Values passed as `--set-string key=value`
    pub values: BTreeMap<String, String>,
    /// When set, helm waits for resources to become ready up to this timeout
    pub timeout: Option<Duration>,
}

impl ReleaseSpec {
    /// Create a release spec without values or timeout.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart: chart.into(),
            values: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Reject requests helm would refuse anyway.
    ///
    /// Release names must be DNS-1123 labels of at most 53 characters.
    pub fn validate(&self) -> Result<(), ChartError> {
        validate_release_name(&self.name)?;
        if self.namespace.is_empty() {
            return Err(ChartError::InvalidRelease(format!(
                "release {} has no namespace",
                self.name
            )));
        }
        if self.chart.trim().is_empty() {
            return Err(ChartError::InvalidRelease(format!(
                "release {} has no chart reference",
                self.name
            )));
        }
        if let Some(key) = self.values.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(ChartError::InvalidRelease(format!(
                "invalid value key '{}' for release {}",
                key, self.name
            )));
        }
        Ok(())
    }
}

/// Check a release name against helm's naming rules.
pub fn validate_release_name(name: &str) -> Result<(), ChartError> {
    if name.is_empty() || name.len() > MAX_RELEASE_NAME_LEN {
        return Err(ChartError::InvalidRelease(format!(
            "release name '{}' must be 1-{} characters",
            name, MAX_RELEASE_NAME_LEN
        )));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(ChartError::InvalidRelease(format!(
            "release name '{}' must be a lowercase DNS-1123 label",
            name
        )));
    }
    Ok(())
}

/// Installed release as reported by helm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Namespace of the release
    pub namespace: String,
    /// Release revision (incremented on every upgrade)
    pub revision: u32,
    /// Release status
    pub status: ReleaseStatus,
    /// Description of the last operation
    pub description: Option<String>,
}

/// Helm release status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Uninstalling,
    Uninstalled,
    Superseded,
    #[serde(other)]
    Unknown,
}

impl ReleaseStatus {
    /// Status literal as printed by helm.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Deployed => "deployed",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::PendingInstall => "pending-install",
            ReleaseStatus::PendingUpgrade => "pending-upgrade",
            ReleaseStatus::PendingRollback => "pending-rollback",
            ReleaseStatus::Uninstalling => "uninstalling",
            ReleaseStatus::Uninstalled => "uninstalled",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Unknown => "unknown",
        }
    }
}

/// Subset of `helm ... --output json` we read
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HelmRelease {
    pub name: String,
    pub namespace: String,
    pub version: u32,
    pub info: HelmReleaseInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HelmReleaseInfo {
    pub status: ReleaseStatus,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<HelmRelease> for Release {
    fn from(r: HelmRelease) -> Self {
        Self {
            name: r.name,
            namespace: r.namespace,
            revision: r.version,
            status: r.info.status,
            description: r.info.description,
        }
    }
}
