//! Desired status for each transition
//!
//! Builders start from the stored status so untouched fields survive, and
//! only move `lastTransitionTime` when the condition itself changes. That
//! keeps a repeated pass equal to what is stored, so no write is issued.

use chart_client::Release;
use chrono::{DateTime, Utc};
use crds::{CFAPIStatus, Condition, ConditionStatus, INSTALLATION_CONDITION, State};

/// Install in progress
pub const REASON_INSTALLING: &str = "Installing";
/// Release deployed
pub const REASON_INSTALLED: &str = "Installed";
/// Install or upgrade failed
pub const REASON_INSTALL_FAILED: &str = "InstallFailed";
/// Uninstall in progress
pub const REASON_UNINSTALLING: &str = "Uninstalling";
/// Uninstall failed
pub const REASON_UNINSTALL_FAILED: &str = "UninstallFailed";

/// Insert or replace a condition by type.
///
/// An unchanged condition (same status, reason and message) is left alone,
/// including its `lastTransitionTime`.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: DateTime<Utc>) {
    condition.last_transition_time = Some(now);
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            let unchanged = existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message;
            if !unchanged {
                *existing = condition;
            }
        }
        None => conditions.push(condition),
    }
}

fn installation(status: ConditionStatus, reason: &str, message: String) -> Condition {
    Condition {
        r#type: INSTALLATION_CONDITION.to_string(),
        status,
        reason: Some(reason.to_string()),
        message: Some(message),
        last_transition_time: None,
    }
}

fn with_condition(
    current: Option<&CFAPIStatus>,
    state: State,
    condition: Condition,
    now: DateTime<Utc>,
) -> CFAPIStatus {
    let mut status = current.cloned().unwrap_or_default();
    status.state = state;
    set_condition(&mut status.conditions, condition, now);
    status
}

/// Apply started.
pub fn processing(current: Option<&CFAPIStatus>, release: &str, now: DateTime<Utc>) -> CFAPIStatus {
    with_condition(
        current,
        State::Processing,
        installation(
            ConditionStatus::Unknown,
            REASON_INSTALLING,
            format!("Installing release {}", release),
        ),
        now,
    )
}

/// Apply succeeded for `generation`. observedGeneration never moves backwards.
pub fn ready(
    current: Option<&CFAPIStatus>,
    ready_state: State,
    generation: Option<i64>,
    release: &Release,
    now: DateTime<Utc>,
) -> CFAPIStatus {
    let mut status = with_condition(
        current,
        ready_state,
        installation(
            ConditionStatus::True,
            REASON_INSTALLED,
            format!(
                "Release {}/{} deployed at revision {}",
                release.namespace, release.name, release.revision
            ),
        ),
        now,
    );
    status.observed_generation = status.observed_generation.max(generation);
    status.error = None;
    status
}

/// Apply failed.
pub fn apply_failed(current: Option<&CFAPIStatus>, message: &str, now: DateTime<Utc>) -> CFAPIStatus {
    let mut status = with_condition(
        current,
        State::Error,
        installation(ConditionStatus::False, REASON_INSTALL_FAILED, message.to_string()),
        now,
    );
    status.error = Some(message.to_string());
    status
}

/// Teardown started.
pub fn deleting(
    current: Option<&CFAPIStatus>,
    deleting_state: State,
    release: &str,
    now: DateTime<Utc>,
) -> CFAPIStatus {
    let mut status = with_condition(
        current,
        deleting_state,
        installation(
            ConditionStatus::Unknown,
            REASON_UNINSTALLING,
            format!("Uninstalling release {}", release),
        ),
        now,
    );
    status.error = None;
    status
}

/// Teardown failed. The state stays at the deleting state.
pub fn teardown_failed(
    current: Option<&CFAPIStatus>,
    deleting_state: State,
    message: &str,
    now: DateTime<Utc>,
) -> CFAPIStatus {
    let mut status = with_condition(
        current,
        deleting_state,
        installation(ConditionStatus::False, REASON_UNINSTALL_FAILED, message.to_string()),
        now,
    );
    status.error = Some(message.to_string());
    status
}
