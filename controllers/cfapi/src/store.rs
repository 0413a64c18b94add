//! State store accessor
//!
//! Reads CFAPI objects and writes back their status or finalizers. Every write
//! carries the `resourceVersion` the caller read, so a concurrent change makes
//! the write fail with `ControllerError::Conflict` instead of overwriting it.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::CFAPI;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use tracing::debug;

/// Trait for CFAPI persistence so the reconciler can run against an in-memory store in tests
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Latest version of the object, `None` if it no longer exists.
    async fn get(&self, key: &ObjectRef<CFAPI>) -> Result<Option<CFAPI>, ControllerError>;

    /// Write `status` only. Returns the object as stored after the write.
    async fn update_status(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError>;

    /// Write `metadata.finalizers` only. Returns the object as stored after the write.
    async fn update_finalizers(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError>;
}

/// `namespace/name` of an object, for logs and errors
pub fn object_key(cfapi: &CFAPI) -> String {
    format!(
        "{}/{}",
        cfapi.namespace().unwrap_or_default(),
        cfapi.name_any()
    )
}

/// Merge patch replacing the whole status. Cleared fields are sent as explicit nulls.
pub(crate) fn status_patch(cfapi: &CFAPI) -> serde_json::Value {
    let status = cfapi.status.as_ref().map(|s| {
        serde_json::json!({
            "state": s.state,
            "observedGeneration": s.observed_generation,
            "conditions": s.conditions,
            "error": s.error,
        })
    });
    serde_json::json!({
        "metadata": { "resourceVersion": cfapi.resource_version() },
        "status": status,
    })
}

/// Merge patch replacing the finalizer list.
pub(crate) fn finalizers_patch(cfapi: &CFAPI) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": cfapi.resource_version(),
            "finalizers": cfapi.metadata.finalizers,
        }
    })
}

fn map_write_error(
    err: kube::Error,
    key: String,
    other: fn(String) -> ControllerError,
) -> ControllerError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 => ControllerError::Conflict(key),
        kube::Error::Api(api_err) if api_err.code == 404 => ControllerError::NotFound(key),
        e => other(format!("{}: {}", key, e)),
    }
}

/// State store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStateStore {
    client: Client,
}

impl KubeStateStore {
    /// Store talking to the API server through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: Option<&str>) -> Api<CFAPI> {
        Api::namespaced(self.client.clone(), namespace.unwrap_or("default"))
    }
}

#[async_trait]
impl StateStore for KubeStateStore {
    async fn get(&self, key: &ObjectRef<CFAPI>) -> Result<Option<CFAPI>, ControllerError> {
        let api = self.api(key.namespace.as_deref());
        Ok(api.get_opt(&key.name).await?)
    }

    async fn update_status(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError> {
        let api = self.api(cfapi.namespace().as_deref());
        let patch = status_patch(cfapi);
        debug!("Patching status of CFAPI {}", object_key(cfapi));
        api.patch_status(&cfapi.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, object_key(cfapi), ControllerError::StatusWriteFailed))
    }

    async fn update_finalizers(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError> {
        let api = self.api(cfapi.namespace().as_deref());
        let patch = finalizers_patch(cfapi);
        debug!("Patching finalizers of CFAPI {}", object_key(cfapi));
        api.patch(&cfapi.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(e, object_key(cfapi), ControllerError::FinalizerWriteFailed))
    }
}
