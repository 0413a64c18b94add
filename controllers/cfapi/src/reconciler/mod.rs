//! Reconciliation logic for CFAPI resources.
//!
//! A pass fetches the object, plans one step from what it sees
//! (`transition::plan`) and carries that step out:
//!
//! - `transition`: pure step selection
//! - `status`: desired status for each transition
//! - `apply`: the apply, teardown and finalizer steps
//!
//! Write conflicts re-run the whole pass against a fresh copy. An object that
//! disappears mid-pass ends the pass without error.

pub mod apply;
pub mod status;
pub mod transition;


use crate::error::ControllerError;
use crate::events::EventRecorder;
use crate::finalizer::{FINALIZER, FinalizerManager};
use crate::rate_limiter::RateLimiter;
use crate::store::StateStore;
use chart_client::ChartClientTrait;
use crds::{CFAPI, State};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use transition::Step;

/// State literals the reconciler drives objects into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalStates {
    ready: State,
    deleting: State,
}

impl Default for TerminalStates {
    fn default() -> Self {
        Self {
            ready: State::Ready,
            deleting: State::Deleting,
        }
    }
}

impl TerminalStates {
    /// The two states must differ, neither may be `Error`, and `ready` may not be `Processing`.
    pub fn new(ready: State, deleting: State) -> Result<Self, ControllerError> {
        if ready == deleting {
            return Err(ControllerError::InvalidConfig(format!(
                "ready and deleting states must differ, both are {}",
                ready
            )));
        }
        if ready == State::Error || deleting == State::Error {
            return Err(ControllerError::InvalidConfig(
                "Error cannot be a terminal state".to_string(),
            ));
        }
        if ready == State::Processing {
            return Err(ControllerError::InvalidConfig(
                "Processing cannot be the ready state".to_string(),
            ));
        }
        Ok(Self { ready, deleting })
    }

    /// State written once the release is deployed
    pub fn ready(&self) -> State {
        self.ready
    }

    /// State written while the release is uninstalled
    pub fn deleting(&self) -> State {
        self.deleting
    }
}

/// Construction-time settings of the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Finalizer marker guarding teardown
    pub finalizer: String,
    /// States for the deployed and deleting phases
    pub terminal_states: TerminalStates,
    /// Chart used when the object does not name one
    pub chart: String,
    /// helm `--wait` timeout, `None` to not wait
    pub helm_timeout: Option<Duration>,
    /// Extra passes after a write conflict before giving up
    pub conflict_retries: u32,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            finalizer: FINALIZER.to_string(),
            terminal_states: TerminalStates::default(),
            chart: crate::config::DEFAULT_CHART_PATH.to_string(),
            helm_timeout: None,
            conflict_retries: crate::config::DEFAULT_CONFLICT_RETRIES,
        }
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do until the object changes
    Done,
    /// Run again after the delay
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// `namespace/name` of a reconcile request
pub fn ref_key(key: &ObjectRef<CFAPI>) -> String {
    format!("{}/{}", key.namespace.as_deref().unwrap_or_default(), key.name)
}

/// Reconciles CFAPI resources.
pub struct Reconciler {
    pub(crate) store: Box<dyn StateStore>,
    pub(crate) charts: Box<dyn ChartClientTrait>,
    pub(crate) events: Box<dyn EventRecorder>,
    pub(crate) rate_limiter: Arc<RateLimiter<ObjectRef<CFAPI>>>,
    pub(crate) finalizers: FinalizerManager,
    pub(crate) options: ReconcilerOptions,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    /// Wire the reconciler to its collaborators.
    ///
    /// `shutdown` flipping to `true` cancels in-flight passes.
    pub fn new(
        store: Box<dyn StateStore>,
        charts: Box<dyn ChartClientTrait>,
        events: Box<dyn EventRecorder>,
        rate_limiter: Arc<RateLimiter<ObjectRef<CFAPI>>>,
        options: ReconcilerOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            charts,
            events,
            rate_limiter,
            finalizers: FinalizerManager::new(options.finalizer.clone()),
            options,
            shutdown,
        }
    }

    /// Reconcile one object.
    ///
    /// `Conflict` re-runs the pass up to `conflict_retries` times, then surfaces.
    /// `NotFound` ends the pass with `Outcome::Done`.
    pub async fn reconcile(&self, key: &ObjectRef<CFAPI>) -> Result<Outcome, ControllerError> {
        let mut conflicts = 0;
        loop {
            match self.reconcile_pass(key).await {
                Err(ControllerError::Conflict(what)) if conflicts < self.options.conflict_retries => {
                    conflicts += 1;
                    debug!(
                        "Conflict on CFAPI {}, re-running pass ({}/{})",
                        what, conflicts, self.options.conflict_retries
                    );
                }
                Err(ControllerError::NotFound(what)) => {
                    debug!("CFAPI {} no longer exists, nothing to do", what);
                    self.rate_limiter.forget(key);
                    return Ok(Outcome::Done);
                }
                result => return result,
            }
        }
    }

    async fn reconcile_pass(&self, key: &ObjectRef<CFAPI>) -> Result<Outcome, ControllerError> {
        self.check_cancelled()?;
        let cfapi = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| ControllerError::NotFound(ref_key(key)))?;

        let step = transition::plan(&cfapi, self.finalizers.marker(), &self.options.terminal_states);
        info!("Reconciling CFAPI {}: {:?}", ref_key(key), step);

        match step {
            Step::Released => {
                self.rate_limiter.forget(key);
                Ok(Outcome::Done)
            }
            Step::AddFinalizer => self.add_finalizer(cfapi).await,
            Step::Teardown => self.teardown(cfapi, key).await,
            Step::Apply => self.apply(cfapi, key).await,
            Step::UpToDate => {
                self.rate_limiter.forget(key);
                Ok(Outcome::Done)
            }
        }
    }

    /// Requeue delay after a failed pass, `None` when the key should wait for a change.
    pub fn error_delay(&self, key: &ObjectRef<CFAPI>, error: &ControllerError) -> Option<Duration> {
        match error {
            ControllerError::Cancelled => None,
            _ => {
                let delay = self.rate_limiter.when(key);
                warn!(
                    "Reconcile of CFAPI {} failed ({} consecutive): {}; retrying in {:?}",
                    ref_key(key),
                    self.rate_limiter.failures(key),
                    error,
                    delay
                );
                Some(delay)
            }
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ControllerError> {
        if *self.shutdown.borrow() {
            Err(ControllerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless shutdown is signalled first; the future is dropped on shutdown.
    pub(crate) async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, ControllerError> {
        tokio::select! {
            biased;
            () = shutdown_signalled(self.shutdown.clone()) => Err(ControllerError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

async fn shutdown_signalled(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // sender dropped without signalling
        std::future::pending::<()>().await;
    }
}
