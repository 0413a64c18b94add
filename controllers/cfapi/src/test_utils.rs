//! Test utilities for unit testing the reconciler
//!
//! In-memory stand-ins for the API server and the event sink, plus helpers
//! for building CFAPI objects.

use crate::error::ControllerError;
use crate::events::EventRecorder;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::reconciler::{Reconciler, ReconcilerOptions};
use crate::store::{StateStore, object_key};
use async_trait::async_trait;
use chart_client::{ChartClientTrait, MockChartClient};
use crds::{CFAPI, CFAPISpec, CFAPIStatus, State};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube_runtime::events::EventType;
use kube_runtime::reflector::ObjectRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// A fixed deletion timestamp
pub fn deletion_timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2024-05-01T12:00:00Z")).unwrap()
}

/// Helper to create a test CFAPI at generation 1
pub fn create_test_cfapi(name: &str, namespace: &str) -> CFAPI {
    CFAPI {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: CFAPISpec::default(),
        status: None,
    }
}

/// Replace the status with a bare state and observed generation
pub fn with_status(mut cfapi: CFAPI, state: State, observed_generation: Option<i64>) -> CFAPI {
    cfapi.status = Some(CFAPIStatus {
        state,
        observed_generation,
        conditions: Vec::new(),
        error: None,
    });
    cfapi
}

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<String, CFAPI>,
    next_version: u64,
    status_writes: usize,
    finalizer_writes: usize,
    deleted: Vec<String>,
    conflicts_to_inject: u32,
    status_failures_to_inject: u32,
    vanish_on_next_write: bool,
}

impl MemoryInner {
    fn bump(&mut self, cfapi: &mut CFAPI) {
        self.next_version += 1;
        cfapi.metadata.resource_version = Some(self.next_version.to_string());
    }

    /// Checks shared by both writes. Returns the key of the stored object.
    fn check_write(&mut self, cfapi: &CFAPI) -> Result<String, ControllerError> {
        let key = object_key(cfapi);
        if self.vanish_on_next_write {
            self.vanish_on_next_write = false;
            self.objects.remove(&key);
            self.deleted.push(key.clone());
        }
        let Some(stored) = self.objects.get(&key) else {
            return Err(ControllerError::NotFound(key));
        };
        if self.conflicts_to_inject > 0 {
            self.conflicts_to_inject -= 1;
            // someone else wrote in between
            let mut moved = stored.clone();
            self.bump(&mut moved);
            self.objects.insert(key.clone(), moved);
            return Err(ControllerError::Conflict(key));
        }
        if stored.metadata.resource_version != cfapi.metadata.resource_version {
            return Err(ControllerError::Conflict(key));
        }
        Ok(key)
    }
}

/// In-memory state store with API server semantics:
/// resourceVersion checks, generation bumps on spec changes and
/// finalizer-gated deletion.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object as if created through the API.
    pub fn insert(&self, mut cfapi: CFAPI) -> CFAPI {
        let mut inner = self.inner.lock().unwrap();
        if cfapi.metadata.generation.is_none() {
            cfapi.metadata.generation = Some(1);
        }
        inner.bump(&mut cfapi);
        inner.objects.insert(object_key(&cfapi), cfapi.clone());
        cfapi
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<CFAPI> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    /// Change the spec; bumps generation and resourceVersion.
    pub fn update_spec(&self, namespace: &str, name: &str, change: impl FnOnce(&mut CFAPISpec)) {
        let mut inner = self.inner.lock().unwrap();
        let key = format!("{}/{}", namespace, name);
        let mut cfapi = inner.objects.get(&key).cloned().expect("object exists");
        change(&mut cfapi.spec);
        cfapi.metadata.generation = Some(cfapi.metadata.generation.unwrap_or(0) + 1);
        inner.bump(&mut cfapi);
        inner.objects.insert(key, cfapi);
    }

    /// Delete as the API server would: objects with finalizers only get a deletionTimestamp.
    pub fn request_delete(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let key = format!("{}/{}", namespace, name);
        let Some(mut cfapi) = inner.objects.get(&key).cloned() else {
            return;
        };
        if cfapi.metadata.finalizers.as_ref().is_none_or(Vec::is_empty) {
            inner.objects.remove(&key);
            inner.deleted.push(key);
            return;
        }
        if cfapi.metadata.deletion_timestamp.is_none() {
            cfapi.metadata.deletion_timestamp = Some(deletion_timestamp());
            inner.bump(&mut cfapi);
            inner.objects.insert(key, cfapi);
        }
    }

    /// The next `n` writes fail with a conflict after a simulated concurrent update.
    pub fn inject_conflicts(&self, n: u32) {
        self.inner.lock().unwrap().conflicts_to_inject = n;
    }

    /// The next `n` status writes fail with a non-conflict error.
    pub fn fail_status_writes(&self, n: u32) {
        self.inner.lock().unwrap().status_failures_to_inject = n;
    }

    /// The object disappears right before the next write.
    pub fn vanish_on_next_write(&self) {
        self.inner.lock().unwrap().vanish_on_next_write = true;
    }

    pub fn status_writes(&self) -> usize {
        self.inner.lock().unwrap().status_writes
    }

    pub fn finalizer_writes(&self) -> usize {
        self.inner.lock().unwrap().finalizer_writes
    }

    /// Write calls made, successful or not
    pub fn writes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.status_writes + inner.finalizer_writes
    }

    /// Keys of objects that were physically removed
    pub fn deleted(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &ObjectRef<CFAPI>) -> Result<Option<CFAPI>, ControllerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .objects
            .get(&crate::reconciler::ref_key(key))
            .cloned())
    }

    async fn update_status(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_writes += 1;
        if inner.status_failures_to_inject > 0 {
            inner.status_failures_to_inject -= 1;
            return Err(ControllerError::StatusWriteFailed(format!(
                "{}: injected failure",
                object_key(cfapi)
            )));
        }
        let key = inner.check_write(cfapi)?;
        let mut stored = inner.objects.get(&key).cloned().expect("checked above");
        stored.status = cfapi.status.clone();
        inner.bump(&mut stored);
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_finalizers(&self, cfapi: &CFAPI) -> Result<CFAPI, ControllerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.finalizer_writes += 1;
        let key = inner.check_write(cfapi)?;
        let mut stored = inner.objects.get(&key).cloned().expect("checked above");
        stored.metadata.finalizers = cfapi.metadata.finalizers.clone().filter(|f| !f.is_empty());
        inner.bump(&mut stored);

        if stored.metadata.deletion_timestamp.is_some() && stored.metadata.finalizers.is_none() {
            inner.objects.remove(&key);
            inner.deleted.push(key);
        } else {
            inner.objects.insert(key, stored.clone());
        }
        Ok(stored)
    }
}

/// An event captured by `RecordingEventRecorder`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub message: String,
}

/// Event recorder that keeps every event in memory
#[derive(Clone, Default)]
pub struct RecordingEventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventRecorder for RecordingEventRecorder {
    async fn record(&self, cfapi: &CFAPI, type_: EventType, reason: &str, message: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: object_key(cfapi),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            message,
        });
    }
}

/// Reconciler wired to in-memory collaborators
pub struct TestHarness {
    pub store: MemoryStateStore,
    pub charts: MockChartClient,
    pub events: RecordingEventRecorder,
    pub rate_limiter: Arc<RateLimiter<ObjectRef<CFAPI>>>,
    pub shutdown: watch::Sender<bool>,
    pub reconciler: Reconciler,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_options(ReconcilerOptions::default())
    }

    pub fn with_options(options: ReconcilerOptions) -> Self {
        let charts = MockChartClient::new();
        Self::build(options, charts.clone(), Box::new(charts))
    }

    /// Use a custom chart client; `charts` is then an unused mock.
    pub fn with_chart_client(client: Box<dyn ChartClientTrait>) -> Self {
        Self::build(ReconcilerOptions::default(), MockChartClient::new(), client)
    }

    fn build(options: ReconcilerOptions, charts: MockChartClient, client: Box<dyn ChartClientTrait>) -> Self {
        let store = MemoryStateStore::new();
        let events = RecordingEventRecorder::default();
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            burst: 200,
            frequency: 30.0,
            base_delay: Duration::from_secs(1),
            failure_max_delay: Duration::from_secs(1000),
        }));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let reconciler = Reconciler::new(
            Box::new(store.clone()),
            client,
            Box::new(events.clone()),
            rate_limiter.clone(),
            options,
            shutdown_rx,
        );
        Self {
            store,
            charts,
            events,
            rate_limiter,
            shutdown,
            reconciler,
        }
    }

    /// Insert a fresh object and return its reconcile key.
    pub fn create(&self, name: &str, namespace: &str) -> ObjectRef<CFAPI> {
        let cfapi = self.store.insert(create_test_cfapi(name, namespace));
        ObjectRef::from_obj(&cfapi)
    }

    /// Reconcile until the pass no longer asks for an immediate requeue.
    pub async fn converge(
        &self,
        key: &ObjectRef<CFAPI>,
    ) -> Result<crate::reconciler::Outcome, ControllerError> {
        for _ in 0..10 {
            match self.reconciler.reconcile(key).await? {
                crate::reconciler::Outcome::RequeueAfter(_) => continue,
                done => return Ok(done),
            }
        }
        panic!("reconcile did not converge");
    }
}
