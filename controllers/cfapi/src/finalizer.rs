//! Finalizer handling
//!
//! The controller's marker in `metadata.finalizers` keeps a CFAPI in the API
//! server until the workload has been torn down.

use crds::CFAPI;

/// Finalizer marker owned by this controller
pub const FINALIZER: &str = "operator.kyma-project.io/cfapi-finalizer";

/// Ordered set of finalizer strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finalizers(Vec<String>);

impl Finalizers {
    /// Read the finalizers of an object. Duplicates are collapsed.
    pub fn of(cfapi: &CFAPI) -> Self {
        let mut set = Self::default();
        for f in cfapi.metadata.finalizers.iter().flatten() {
            set.add(f);
        }
        set
    }

    /// Whether `marker` is in the set.
    #[must_use]
    pub fn has(&self, marker: &str) -> bool {
        self.0.iter().any(|f| f == marker)
    }

    /// Returns true if the marker was not there before.
    pub fn add(&mut self, marker: &str) -> bool {
        if self.has(marker) {
            return false;
        }
        self.0.push(marker.to_string());
        true
    }

    /// Returns true if the marker was there before.
    pub fn remove(&mut self, marker: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|f| f != marker);
        self.0.len() != before
    }

    /// No finalizers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Write the set back to the object.
    pub fn apply_to(self, cfapi: &mut CFAPI) {
        cfapi.metadata.finalizers = if self.is_empty() { None } else { Some(self.0) };
    }
}

/// Adds and removes the controller's finalizer marker on in-memory objects.
///
/// Persisting the change is up to the caller.
#[derive(Debug, Clone)]
pub struct FinalizerManager {
    marker: String,
}

impl Default for FinalizerManager {
    fn default() -> Self {
        Self::new(FINALIZER)
    }
}

impl FinalizerManager {
    /// Manager for a custom marker.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// The finalizer string managed.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether the object carries the marker.
    #[must_use]
    pub fn is_present(&self, cfapi: &CFAPI) -> bool {
        Finalizers::of(cfapi).has(&self.marker)
    }

    /// Add the marker unless it is there or deletion was already requested.
    ///
    /// Returns whether the object changed.
    pub fn ensure_present(&self, cfapi: &mut CFAPI) -> bool {
        if cfapi.deletion_requested() {
            return false;
        }
        let mut finalizers = Finalizers::of(cfapi);
        if !finalizers.add(&self.marker) {
            return false;
        }
        finalizers.apply_to(cfapi);
        true
    }

    /// Remove the marker. Only call once teardown has succeeded.
    ///
    /// Returns whether the object changed.
    pub fn ensure_removed(&self, cfapi: &mut CFAPI) -> bool {
        let mut finalizers = Finalizers::of(cfapi);
        if !finalizers.remove(&self.marker) {
            return false;
        }
        finalizers.apply_to(cfapi);
        true
    }
}
