//! Decide what a reconcile pass does, from the fetched object alone.

use super::TerminalStates;
use crate::finalizer::Finalizers;
use crds::CFAPI;

/// Next step for a CFAPI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deletion requested and our finalizer is still there: uninstall, then release the object.
    Teardown,
    /// Deletion requested and our finalizer is gone: nothing left to do.
    Released,
    /// Live object without our finalizer: add it before doing anything else.
    AddFinalizer,
    /// Spec not applied yet, or last apply did not reach the ready state.
    Apply,
    /// Ready for the current generation.
    UpToDate,
}

/// Plan the next step. Pure: the same object always yields the same step.
pub fn plan(cfapi: &CFAPI, marker: &str, terminal: &TerminalStates) -> Step {
    let has_finalizer = Finalizers::of(cfapi).has(marker);

    if cfapi.deletion_requested() {
        return if has_finalizer {
            Step::Teardown
        } else {
            Step::Released
        };
    }

    if !has_finalizer {
        return Step::AddFinalizer;
    }

    let generation = cfapi.metadata.generation.unwrap_or(0);
    let applied = cfapi
        .observed_generation()
        .is_some_and(|observed| observed >= generation);

    if applied && cfapi.state() == Some(terminal.ready()) {
        Step::UpToDate
    } else {
        Step::Apply
    }
}
