//! Helm CLI client
//!
//! Runs `helm` as a child process. Every child is spawned with `kill_on_drop`,
//! so cancelling a call (dropping its future) terminates helm.

use crate::chart_trait::ChartClientTrait;
use crate::error::ChartError;
use crate::models::{HelmRelease, Release, ReleaseSpec, ReleaseStatus, validate_release_name};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Chart client backed by the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmClient {
    binary: String,
}

impl HelmClient {
    /// Create a client that runs the given helm executable.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The helm executable this client runs
    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[String]) -> Result<String, ChartError> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ChartError::CommandFailed {
                command: args.first().cloned().unwrap_or_default(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments for `helm upgrade --install`
pub fn install_args(spec: &ReleaseSpec) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        spec.name.clone(),
        spec.chart.clone(),
        "--namespace".to_string(),
        spec.namespace.clone(),
        "--create-namespace".to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    if let Some(timeout) = spec.timeout {
        args.push("--wait".to_string());
        args.push("--timeout".to_string());
        args.push(format_timeout(timeout));
    }
    for (key, value) in &spec.values {
        args.push("--set-string".to_string());
        // helm splits --set arguments on unescaped commas
        args.push(format!("{}={}", key, value.replace(',', "\\,")));
    }
    args
}

/// Arguments for `helm uninstall`
pub fn uninstall_args(name: &str, namespace: &str) -> Vec<String> {
    vec![
        "uninstall".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
    ]
}

/// Arguments for `helm status`
pub fn status_args(name: &str, namespace: &str) -> Vec<String> {
    vec![
        "status".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn format_timeout(timeout: Duration) -> String {
    format!("{}s", timeout.as_secs().max(1))
}

fn parse_release(stdout: &str) -> Result<Release, ChartError> {
    let release: HelmRelease = serde_json::from_str(stdout.trim())?;
    Ok(release.into())
}

#[async_trait::async_trait]
impl ChartClientTrait for HelmClient {
    async fn install(&self, spec: &ReleaseSpec) -> Result<Release, ChartError> {
        spec.validate()?;
        info!(
            "Installing release {} in namespace {} from chart {}",
            spec.name, spec.namespace, spec.chart
        );

        let stdout = self.run(&install_args(spec)).await?;
        let release = parse_release(&stdout)?;

        if release.status != ReleaseStatus::Deployed {
            warn!(
                "Release {}/{} reported status {} after install",
                release.namespace,
                release.name,
                release.status.as_str()
            );
            return Err(ChartError::ReleaseFailed {
                name: release.name,
                status: release.status.as_str().to_string(),
            });
        }

        info!(
            "Release {}/{} deployed at revision {}",
            release.namespace, release.name, release.revision
        );
        Ok(release)
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<(), ChartError> {
        validate_release_name(name)?;
        info!("Uninstalling release {} from namespace {}", name, namespace);

        match self.run(&uninstall_args(name, namespace)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(ChartError::ReleaseNotFound(format!(
                "{}/{}",
                namespace, name
            ))),
            Err(e) => Err(e),
        }
    }

    async fn status(&self, name: &str, namespace: &str) -> Result<Option<Release>, ChartError> {
        validate_release_name(name)?;

        match self.run(&status_args(name, namespace)).await {
            Ok(stdout) => parse_release(&stdout).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
