//! CFAPI CRD
//!
//! Requests installation of the CF API workload chart into the cluster.
//! The controller only reads `spec` and only writes `status` and `metadata.finalizers`.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Condition type reporting the outcome of the last chart operation.
pub const INSTALLATION_CONDITION: &str = "Installation";

/// Longest release name helm accepts.
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// DNS-1123 label, the form helm requires for release names.
pub const RELEASE_NAME_PATTERN: &str = "^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";

/// Hex digits of the name hash appended to derived release names.
const RELEASE_NAME_HASH_LEN: usize = 8;

fn release_name_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "string",
        "minLength": 1,
        "maxLength": MAX_RELEASE_NAME_LEN,
        "pattern": RELEASE_NAME_PATTERN,
    })
}

/// Desired CF API workload installation
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1alpha1",
    kind = "CFAPI",
    plural = "cfapis",
    shortname = "cfapi",
    namespaced,
    status = "CFAPIStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFAPISpec {
    /// Helm release name (defaults to one derived from the CFAPI name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "release_name_schema")]
    pub release_name: Option<String>,

    /// Namespace the workload is installed into (defaults to the CFAPI namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    /// Chart reference override (defaults to the chart the controller was started with)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    /// Chart values, passed as `--set-string key=value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

/// Observed state of a CFAPI, written only by the controller
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CFAPIStatus {
    /// Lifecycle state
    pub state: State,

    /// Last spec generation that was applied successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the last chart operation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Error message if the last apply or teardown failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
/// CFAPI lifecycle state
///
/// Serializes as PascalCase ("Ready", "Error", etc.) and also accepts
/// lowercase on read.
#[serde(rename_all = "PascalCase")]
pub enum State {
    /// Spec observed, workload being applied
    #[default]
    #[serde(alias = "processing")]
    Processing,

    /// Workload applied for the observed generation
    #[serde(alias = "ready")]
    Ready,

    /// Last apply failed, will be retried
    #[serde(alias = "error")]
    Error,

    /// Deletion requested, workload being removed
    #[serde(alias = "deleting")]
    Deleting,
}

impl State {
    /// PascalCase literal as stored in the CRD.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            State::Processing => "Processing",
            State::Ready => "Ready",
            State::Error => "Error",
            State::Deleting => "Deleting",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kubernetes-style status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. "Installation"
    pub r#type: String,

    /// "True", "False" or "Unknown"
    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time status, reason or message changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Truth value of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not determined yet
    Unknown,
}

impl CFAPI {
    /// Current status state, if a status was ever written.
    #[must_use]
    pub fn state(&self) -> Option<State> {
        self.status.as_ref().map(|s| s.state)
    }

    /// Generation last applied successfully.
    #[must_use]
    pub fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }

    /// Helm release name for this object.
    ///
    /// `spec.releaseName` when set, otherwise derived from the object name.
    #[must_use]
    pub fn release_name(&self) -> String {
        self.spec
            .release_name
            .clone()
            .unwrap_or_else(|| derive_release_name(&self.name_any()))
    }

    /// Namespace the workload is installed into.
    #[must_use]
    pub fn target_namespace(&self) -> String {
        self.spec
            .target_namespace
            .clone()
            .or_else(|| self.namespace())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Whether the API server has been asked to delete this object.
    #[must_use]
    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Map an object name onto a valid helm release name.
///
/// Names that already are DNS-1123 labels within the length limit are kept.
/// Anything else has its invalid characters replaced by `-`, is cut short if
/// needed and gets a suffix hashed from the full name, so distinct objects
/// keep distinct releases.
#[must_use]
pub fn derive_release_name(object_name: &str) -> String {
    if is_release_name(object_name) {
        return object_name.to_string();
    }

    let sanitized: String = object_name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' }
        })
        .collect();
    let digest = format!("{:x}", Sha256::digest(object_name.as_bytes()));
    let suffix = &digest[..RELEASE_NAME_HASH_LEN];

    let room = MAX_RELEASE_NAME_LEN - RELEASE_NAME_HASH_LEN - 1;
    let prefix: String = sanitized.chars().take(room).collect();
    let prefix = prefix.trim_matches('-');
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}-{}", prefix, suffix)
    }
}

fn is_release_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_RELEASE_NAME_LEN
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_pascal_case() {
        let json = serde_json::to_string(&State::Deleting).unwrap();
        assert_eq!(json, "\"Deleting\"");
    }

    #[test]
    fn state_accepts_lowercase() {
        let state: State = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(state, State::Ready);
    }

    #[test]
    fn release_name_defaults_to_object_name() {
        let mut cfapi = CFAPI::new("default-cfapi", CFAPISpec::default());
        cfapi.metadata.namespace = Some("kyma-system".to_string());
        assert_eq!(cfapi.release_name(), "default-cfapi");
        assert_eq!(cfapi.target_namespace(), "kyma-system");

        cfapi.spec.release_name = Some("cf-api".to_string());
        cfapi.spec.target_namespace = Some("cf-system".to_string());
        assert_eq!(cfapi.release_name(), "cf-api");
        assert_eq!(cfapi.target_namespace(), "cf-system");
    }

    #[test]
    fn release_name_is_derived_for_dotted_names() {
        let name = derive_release_name("cf.api");
        assert!(name.starts_with("cf-api-"), "{name}");
        assert_eq!(name.len(), "cf-api-".len() + RELEASE_NAME_HASH_LEN);
        assert!(is_release_name(&name));
        assert_eq!(name, derive_release_name("cf.api"));
        assert_ne!(name, derive_release_name("cf-api"));
    }

    #[test]
    fn release_name_is_truncated_for_long_names() {
        let long = "a".repeat(60);
        let name = derive_release_name(&long);
        assert_eq!(name.len(), MAX_RELEASE_NAME_LEN);
        assert!(is_release_name(&name));

        let other = derive_release_name(&format!("{}b", "a".repeat(59)));
        assert_ne!(name, other, "hash suffix keeps truncated names apart");
    }

    #[test]
    fn release_name_never_ends_in_a_dash() {
        // the cut lands right after a separator
        let name = derive_release_name(&format!("{}.tail", "a".repeat(43)));
        assert!(is_release_name(&name), "{name}");
    }

    #[test]
    fn release_name_schema_is_a_dns_label() {
        let crd = serde_json::to_value(<CFAPI as kube::CustomResourceExt>::crd()).unwrap();
        let field = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
            ["properties"]["releaseName"];
        assert_eq!(field["maxLength"], 53);
        assert_eq!(field["pattern"], RELEASE_NAME_PATTERN);
    }

    #[test]
    fn status_round_trips_observed_generation() {
        let status = CFAPIStatus {
            state: State::Ready,
            observed_generation: Some(3),
            conditions: Vec::new(),
            error: None,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "Ready");
        assert_eq!(value["observedGeneration"], 3);
        assert!(value.get("error").is_none());
    }
}
