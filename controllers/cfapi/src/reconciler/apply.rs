//! Apply, teardown and finalizer steps.

use super::{Outcome, Reconciler, status};
use crate::error::ControllerError;
use crate::events::reasons;
use crate::metrics;
use crate::store::object_key;
use chart_client::{ChartError, ReleaseSpec};
use crds::{CFAPI, CFAPIStatus};
use kube_runtime::events::EventType;
use kube_runtime::reflector::ObjectRef;
use tracing::{error, info, warn};

impl Reconciler {
    /// Release the object's workload is installed as.
    pub fn release_spec(&self, cfapi: &CFAPI) -> ReleaseSpec {
        let chart = cfapi
            .spec
            .chart
            .clone()
            .unwrap_or_else(|| self.options.chart.clone());
        let mut spec = ReleaseSpec::new(cfapi.release_name(), cfapi.target_namespace(), chart);
        spec.values = cfapi.spec.values.clone();
        spec.timeout = self.options.helm_timeout;
        spec
    }

    /// Persist `desired` unless it is already the stored status.
    async fn write_status(&self, cfapi: CFAPI, desired: CFAPIStatus) -> Result<CFAPI, ControllerError> {
        if cfapi.status.as_ref() == Some(&desired) {
            return Ok(cfapi);
        }
        self.check_cancelled()?;
        let mut updated = cfapi;
        updated.status = Some(desired);
        self.store.update_status(&updated).await
    }

    pub(super) async fn add_finalizer(&self, cfapi: CFAPI) -> Result<Outcome, ControllerError> {
        let mut updated = cfapi;
        if self.finalizers.ensure_present(&mut updated) {
            self.check_cancelled()?;
            let stored = self.store.update_finalizers(&updated).await?;
            info!("Added finalizer to CFAPI {}", object_key(&stored));
            self.events
                .record(
                    &stored,
                    EventType::Normal,
                    reasons::FINALIZER_ADDED,
                    format!("Added finalizer {}", self.finalizers.marker()),
                )
                .await;
        }
        Ok(Outcome::RequeueAfter(self.rate_limiter.throttle()))
    }

    pub(super) async fn apply(
        &self,
        cfapi: CFAPI,
        key: &ObjectRef<CFAPI>,
    ) -> Result<Outcome, ControllerError> {
        let name = object_key(&cfapi);
        let release = self.release_spec(&cfapi);
        let generation = cfapi.metadata.generation;
        let mut cfapi = cfapi;

        if cfapi.state() != Some(crds::State::Processing) {
            let desired = status::processing(cfapi.status.as_ref(), &release.name, chrono::Utc::now());
            cfapi = self.write_status(cfapi, desired).await?;
            self.events
                .record(
                    &cfapi,
                    EventType::Normal,
                    reasons::PROCESSING,
                    format!("Installing release {}/{}", release.namespace, release.name),
                )
                .await;
        }

        self.check_cancelled()?;
        info!(
            "Applying CFAPI {} (generation {}) as release {}/{}",
            name,
            generation.unwrap_or_default(),
            release.namespace,
            release.name
        );
        let result = self.until_cancelled(self.charts.install(&release)).await?;
        metrics::record_chart_operation("install", result.is_ok());

        match result {
            Ok(installed) => {
                let desired = status::ready(
                    cfapi.status.as_ref(),
                    self.options.terminal_states.ready(),
                    generation,
                    &installed,
                    chrono::Utc::now(),
                );
                let cfapi = self.write_status(cfapi, desired).await?;
                info!(
                    "CFAPI {} is {} at release revision {}",
                    name,
                    self.options.terminal_states.ready(),
                    installed.revision
                );
                self.events
                    .record(
                        &cfapi,
                        EventType::Normal,
                        reasons::READY,
                        format!(
                            "Release {}/{} deployed at revision {}",
                            installed.namespace, installed.name, installed.revision
                        ),
                    )
                    .await;
                self.rate_limiter.forget(key);
                Ok(Outcome::Done)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Failed to apply CFAPI {}: {}", name, message);
                let desired = status::apply_failed(cfapi.status.as_ref(), &message, chrono::Utc::now());
                let cfapi = self.write_status(cfapi, desired).await?;
                self.events
                    .record(&cfapi, EventType::Warning, reasons::APPLY_FAILED, message.clone())
                    .await;
                Err(ControllerError::ApplyFailed(format!("{}: {}", name, message)))
            }
        }
    }

    pub(super) async fn teardown(
        &self,
        cfapi: CFAPI,
        key: &ObjectRef<CFAPI>,
    ) -> Result<Outcome, ControllerError> {
        let name = object_key(&cfapi);
        let release_name = cfapi.release_name();
        let release_namespace = cfapi.target_namespace();
        let deleting = self.options.terminal_states.deleting();
        let mut cfapi = cfapi;

        if cfapi.state() != Some(deleting) {
            let desired = status::deleting(cfapi.status.as_ref(), deleting, &release_name, chrono::Utc::now());
            cfapi = self.write_status(cfapi, desired).await?;
            self.events
                .record(
                    &cfapi,
                    EventType::Normal,
                    reasons::DELETING,
                    format!("Uninstalling release {}/{}", release_namespace, release_name),
                )
                .await;
        }

        self.check_cancelled()?;
        info!("Tearing down CFAPI {}: release {}/{}", name, release_namespace, release_name);
        let result = self
            .until_cancelled(self.remove_release(&release_name, &release_namespace))
            .await?;

        if let Err(e) = result {
            let message = e.to_string();
            error!("Failed to tear down CFAPI {}: {}", name, message);
            let desired = status::teardown_failed(cfapi.status.as_ref(), deleting, &message, chrono::Utc::now());
            let cfapi = self.write_status(cfapi, desired).await?;
            self.events
                .record(&cfapi, EventType::Warning, reasons::TEARDOWN_FAILED, message.clone())
                .await;
            return Err(ControllerError::TeardownFailed(format!("{}: {}", name, message)));
        }

        let mut released = cfapi;
        if self.finalizers.ensure_removed(&mut released) {
            self.check_cancelled()?;
            let stored = self.store.update_finalizers(&released).await?;
            info!("Removed finalizer from CFAPI {}", name);
            self.events
                .record(
                    &stored,
                    EventType::Normal,
                    reasons::FINALIZER_REMOVED,
                    format!("Removed finalizer {}", self.finalizers.marker()),
                )
                .await;
        }
        self.rate_limiter.forget(key);
        Ok(Outcome::Done)
    }

    /// Uninstall a release if it exists.
    ///
    /// A release that is not installed, or whose name helm would never have
    /// accepted, leaves nothing to remove.
    async fn remove_release(&self, name: &str, namespace: &str) -> Result<(), ChartError> {
        match self.charts.status(name, namespace).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("Release {}/{} is not installed, nothing to uninstall", namespace, name);
                return Ok(());
            }
            Err(ChartError::InvalidRelease(reason)) => {
                warn!(
                    "Release {}/{} cannot exist ({}), nothing to uninstall",
                    namespace, name, reason
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let result = match self.charts.uninstall(name, namespace).await {
            Err(e) if e.is_not_found() => {
                warn!("Release {}/{} already gone", namespace, name);
                Ok(())
            }
            other => other,
        };
        metrics::record_chart_operation("uninstall", result.is_ok());
        result
    }
}
