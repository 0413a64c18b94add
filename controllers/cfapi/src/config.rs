//! Controller configuration
//!
//! Read once at startup from environment variables. Parsing goes through a
//! lookup closure so tests never touch the process environment.

use crate::error::ControllerError;
use crate::rate_limiter::RateLimiterConfig;
use std::time::Duration;

/// Chart installed when a CFAPI does not name one
pub const DEFAULT_CHART_PATH: &str = "./charts/cfapi";
/// helm executable, resolved through `PATH`
pub const DEFAULT_HELM_BINARY: &str = "helm";
/// helm `--wait` timeout
pub const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Idle time after which a key's failure history is dropped
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(60 * 60);
/// Reconciles running at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;
/// Extra passes after a write conflict
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;
/// Port of the metrics and probe server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Runtime configuration of the controller binary
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// Default chart reference
    pub chart: String,
    /// helm executable
    pub helm_binary: String,
    /// `--wait --timeout` passed to installs
    pub helm_timeout: Duration,
    /// Rate limiter tuning
    pub rate_limiter: RateLimiterConfig,
    /// Idle failure entries older than this are dropped
    pub rate_limiter_entry_ttl: Duration,
    /// Parallel reconciles across different objects
    pub max_concurrent_reconciles: u16,
    /// Inline re-runs of a pass after a write conflict
    pub conflict_retries: u32,
    /// Port of the metrics/probe server
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            chart: DEFAULT_CHART_PATH.to_string(),
            helm_binary: DEFAULT_HELM_BINARY.to_string(),
            helm_timeout: DEFAULT_HELM_TIMEOUT,
            rate_limiter: RateLimiterConfig::default(),
            rate_limiter_entry_ttl: DEFAULT_ENTRY_TTL,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset and empty variables fall back to defaults; malformed values are
    /// rejected with `ControllerError::InvalidConfig`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();
        let limiter_defaults = RateLimiterConfig::default();

        let rate_limiter = RateLimiterConfig {
            burst: parse_or("RATE_LIMITER_BURST", get("RATE_LIMITER_BURST"), limiter_defaults.burst)?,
            frequency: parse_or(
                "RATE_LIMITER_FREQUENCY",
                get("RATE_LIMITER_FREQUENCY"),
                limiter_defaults.frequency,
            )?,
            base_delay: duration_or(
                "FAILURE_BASE_DELAY",
                get("FAILURE_BASE_DELAY"),
                limiter_defaults.base_delay,
            )?,
            failure_max_delay: duration_or(
                "FAILURE_MAX_DELAY",
                get("FAILURE_MAX_DELAY"),
                limiter_defaults.failure_max_delay,
            )?,
        };
        rate_limiter.validate()?;

        let config = Self {
            namespace: get("WATCH_NAMESPACE"),
            chart: get("CHART_PATH").unwrap_or(defaults.chart),
            helm_binary: get("HELM_BINARY").unwrap_or(defaults.helm_binary),
            helm_timeout: duration_or("HELM_TIMEOUT", get("HELM_TIMEOUT"), defaults.helm_timeout)?,
            rate_limiter,
            rate_limiter_entry_ttl: duration_or(
                "RATE_LIMITER_ENTRY_TTL",
                get("RATE_LIMITER_ENTRY_TTL"),
                defaults.rate_limiter_entry_ttl,
            )?,
            max_concurrent_reconciles: parse_or(
                "MAX_CONCURRENT_RECONCILES",
                get("MAX_CONCURRENT_RECONCILES"),
                defaults.max_concurrent_reconciles,
            )?,
            conflict_retries: parse_or(
                "CONFLICT_RETRIES",
                get("CONFLICT_RETRIES"),
                defaults.conflict_retries,
            )?,
            metrics_port: parse_or("METRICS_PORT", get("METRICS_PORT"), defaults.metrics_port)?,
        };

        if config.max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}='{}': {}", key, raw, e))),
    }
}

fn duration_or(key: &str, value: Option<String>, default: Duration) -> Result<Duration, ControllerError> {
    match value {
        None => Ok(default),
        Some(raw) => parse_duration(&raw)
            .map_err(|e| ControllerError::InvalidConfig(format!("{}: {}", key, e))),
    }
}

/// Parse a duration of the form `<number><unit>`.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`. The number must be greater than zero.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim().to_lowercase();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' has no unit (expected ms, s, m, h or d)", value))?;
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(format!("duration '{}' must start with a number", value));
    }
    let number: u64 = number
        .parse()
        .map_err(|e| format!("invalid number in duration '{}': {}", value, e))?;
    if number == 0 {
        return Err(format!("duration '{}' must be greater than 0", value));
    }

    let millis_per_unit: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => {
            return Err(format!(
                "invalid unit '{}' in duration '{}' (expected ms, s, m, h or d)",
                unit, value
            ));
        }
    };

    number
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration '{}' is too large", value))
}
