//! Mock chart client for testing
//!
//! Keeps releases in memory and records every call. Failures can be
//! injected for the next N installs or uninstalls.

use crate::chart_trait::ChartClientTrait;
use crate::error::ChartError;
use crate::models::{Release, ReleaseSpec, ReleaseStatus, validate_release_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartCall {
    Install(ReleaseSpec),
    Uninstall { name: String, namespace: String },
    Status { name: String, namespace: String },
}

/// Mock chart client
#[derive(Debug, Clone, Default)]
pub struct MockChartClient {
    releases: Arc<Mutex<HashMap<(String, String), Release>>>,
    calls: Arc<Mutex<Vec<ChartCall>>>,
    install_failures: Arc<Mutex<u32>>,
    uninstall_failures: Arc<Mutex<u32>>,
}

impl MockChartClient {
    /// Empty mock: no releases, no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` installs fail.
    pub fn fail_next_installs(&self, n: u32) {
        *self.install_failures.lock().unwrap() = n;
    }

    /// Make the next `n` uninstalls fail.
    pub fn fail_next_uninstalls(&self, n: u32) {
        *self.uninstall_failures.lock().unwrap() = n;
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ChartCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Install calls made, including failed ones
    pub fn install_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ChartCall::Install(_)))
            .count()
    }

    /// Uninstall calls made, including failed ones
    pub fn uninstall_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ChartCall::Uninstall { .. }))
            .count()
    }

    /// Currently installed release, if any
    pub fn release(&self, name: &str, namespace: &str) -> Option<Release> {
        self.releases
            .lock()
            .unwrap()
            .get(&(name.to_string(), namespace.to_string()))
            .cloned()
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait::async_trait]
impl ChartClientTrait for MockChartClient {
    async fn install(&self, spec: &ReleaseSpec) -> Result<Release, ChartError> {
        self.calls.lock().unwrap().push(ChartCall::Install(spec.clone()));
        spec.validate()?;

        if Self::take_failure(&self.install_failures) {
            return Err(ChartError::CommandFailed {
                command: "upgrade".to_string(),
                code: Some(1),
                stderr: "mock install failure".to_string(),
            });
        }

        let mut releases = self.releases.lock().unwrap();
        let key = (spec.name.clone(), spec.namespace.clone());
        let revision = releases.get(&key).map_or(1, |r| r.revision + 1);
        let release = Release {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            revision,
            status: ReleaseStatus::Deployed,
            description: Some(if revision == 1 {
                "Install complete".to_string()
            } else {
                "Upgrade complete".to_string()
            }),
        };
        releases.insert(key, release.clone());
        Ok(release)
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<(), ChartError> {
        self.calls.lock().unwrap().push(ChartCall::Uninstall {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        validate_release_name(name)?;

        if Self::take_failure(&self.uninstall_failures) {
            return Err(ChartError::CommandFailed {
                command: "uninstall".to_string(),
                code: Some(1),
                stderr: "mock uninstall failure".to_string(),
            });
        }

        self.releases
            .lock()
            .unwrap()
            .remove(&(name.to_string(), namespace.to_string()))
            .map(|_| ())
            .ok_or_else(|| ChartError::ReleaseNotFound(format!("{}/{}", namespace, name)))
    }

    async fn status(&self, name: &str, namespace: &str) -> Result<Option<Release>, ChartError> {
        self.calls.lock().unwrap().push(ChartCall::Status {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        validate_release_name(name)?;
        Ok(self.release(name, namespace))
    }
}
