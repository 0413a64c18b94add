//! Runtime wiring.
//!
//! Hooks the reconciler into `kube_runtime::Controller`, which owns the watch,
//! the per-key work queue and the concurrency limit.

use crate::error::ControllerError;
use crate::metrics;
use crate::reconciler::Reconciler;
use crate::server::Readiness;
use crds::CFAPI;
use futures::StreamExt;
use kube::Api;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

async fn reconcile(cfapi: Arc<CFAPI>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let key = ObjectRef::from_obj(cfapi.as_ref());
    metrics::increment_reconciliations();

    let start = Instant::now();
    let result = reconciler.reconcile(&key).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    result.map(Action::from)
}

fn error_policy(cfapi: Arc<CFAPI>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    metrics::increment_reconciliation_errors(error);
    let key = ObjectRef::from_obj(cfapi.as_ref());
    match reconciler.error_delay(&key, error) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Run the controller until a shutdown signal arrives.
///
/// `readiness` reports ready for as long as the reconcile stream runs.
pub async fn run(api: Api<CFAPI>, reconciler: Arc<Reconciler>, concurrency: u16, readiness: Arc<Readiness>) {
    info!("Starting CFAPI controller (concurrency {})", concurrency);

    let stream = Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler);

    readiness.controller_started();
    stream
        .for_each(|result| {
            match result {
                Ok((obj, _)) => debug!("Reconciled CFAPI {}", crate::reconciler::ref_key(&obj)),
                Err(e) => warn!("Controller error: {}", e),
            }
            std::future::ready(())
        })
        .await;
    readiness.controller_stopped();

    info!("CFAPI controller stopped");
}
