//! Kubernetes Event recording
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! the reconcile.

use async_trait::async_trait;
use crds::CFAPI;
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Name reported as the event source
pub const REPORTING_CONTROLLER: &str = "cfapi-controller";

/// Sink for CFAPI lifecycle events
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record an event about `cfapi`. Never fails the caller.
    async fn record(&self, cfapi: &CFAPI, type_: EventType, reason: &str, message: String);
}

/// Production recorder wrapping `kube_runtime::events::Recorder`.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Recorder reporting as `cfapi-controller`.
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: REPORTING_CONTROLLER.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, cfapi: &CFAPI, type_: EventType, reason: &str, message: String) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(message),
            action: actions::RECONCILE.to_string(),
            secondary: None,
        };
        let reference = cfapi.object_ref(&());
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// Finalizer stored on a new object
    pub const FINALIZER_ADDED: &str = "FinalizerAdded";
    /// Install of a new generation started
    pub const PROCESSING: &str = "Processing";
    /// Release deployed for the current generation
    pub const READY: &str = "Ready";
    /// Install or upgrade failed
    pub const APPLY_FAILED: &str = "ApplyFailed";
    /// Deletion requested, uninstall started
    pub const DELETING: &str = "Deleting";
    /// Uninstall failed, finalizer kept
    pub const TEARDOWN_FAILED: &str = "TeardownFailed";
    /// Teardown done, object released for deletion
    pub const FINALIZER_REMOVED: &str = "FinalizerRemoved";
}

/// Event actions
pub mod actions {
    /// Every event comes out of a reconcile pass
    pub const RECONCILE: &str = "Reconcile";
}
