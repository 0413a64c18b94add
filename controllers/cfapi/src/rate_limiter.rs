//! # Rate Limiter
//!
//! Decides how long a key waits before its next reconcile attempt.
//!
//! Two limits are combined:
//!
//! - a per-key exponential backoff, `base_delay * 2^failures`, capped at
//!   `failure_max_delay`. The failure count grows on every failed attempt and
//!   is reset by `forget` once the key reconciles successfully;
//! - one token bucket shared by all keys (`burst` tokens, refilled at
//!   `frequency` tokens per second). When the bucket is empty a reservation
//!   still succeeds but returns the wait until its token is available, so
//!   reservations queue up behind each other.
//!
//! A failed attempt waits for the larger of the two. Failure entries that sit
//! idle longer than a TTL are dropped by `gc`.

use crate::error::ControllerError;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Rate limiter tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Token bucket size
    pub burst: u32,
    /// Tokens added per second
    pub frequency: f64,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound of the per-key delay
    pub failure_max_delay: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            burst: 200,
            frequency: 30.0,
            base_delay: Duration::from_secs(1),
            failure_max_delay: Duration::from_secs(1000),
        }
    }
}

impl RateLimiterConfig {
    /// Reject settings the limiter cannot work with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.burst == 0 {
            return Err(ControllerError::InvalidConfig(
                "rate limiter burst must be at least 1".to_string(),
            ));
        }
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(ControllerError::InvalidConfig(format!(
                "rate limiter frequency must be a positive number, got {}",
                self.frequency
            )));
        }
        if self.base_delay.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "failure base delay must be greater than zero".to_string(),
            ));
        }
        if self.failure_max_delay < self.base_delay {
            return Err(ControllerError::InvalidConfig(format!(
                "failure max delay {:?} is below base delay {:?}",
                self.failure_max_delay, self.base_delay
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureEntry {
    failures: u32,
    last_failure: Instant,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key backoff combined with a shared token bucket
#[derive(Debug)]
pub struct RateLimiter<K> {
    config: RateLimiterConfig,
    entries: Mutex<HashMap<K, FailureEntry>>,
    bucket: Mutex<Bucket>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State stays consistent between statements, so a poisoned lock is still usable.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    /// Create a limiter with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Create a limiter whose bucket was last refilled at `now`.
    pub fn new_at(config: RateLimiterConfig, now: Instant) -> Self {
        let tokens = f64::from(config.burst);
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            bucket: Mutex::new(Bucket {
                tokens,
                last_refill: now,
            }),
        }
    }

    /// Per-key delay after `failures` previous failures.
    ///
    /// Non-decreasing in `failures` and never above `failure_max_delay`.
    #[must_use]
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let max = self.config.failure_max_delay;
        2u32.checked_pow(failures)
            .and_then(|factor| self.config.base_delay.checked_mul(factor))
            .map_or(max, |delay| delay.min(max))
    }

    /// Delay for a key whose attempt just failed.
    pub fn when(&self, key: &K) -> Duration {
        self.when_at(key, Instant::now())
    }

    /// `when` at an explicit instant.
    pub fn when_at(&self, key: &K, now: Instant) -> Duration {
        let backoff = {
            let mut entries = lock(&self.entries);
            let entry = entries.entry(key.clone()).or_insert(FailureEntry {
                failures: 0,
                last_failure: now,
            });
            let backoff = self.backoff_for(entry.failures);
            entry.failures = entry.failures.saturating_add(1);
            entry.last_failure = now;
            backoff
        };
        backoff.max(self.reserve_at(now))
    }

    /// Delay for an immediate requeue; only the shared bucket applies.
    pub fn throttle(&self) -> Duration {
        self.throttle_at(Instant::now())
    }

    /// `throttle` at an explicit instant.
    pub fn throttle_at(&self, now: Instant) -> Duration {
        self.reserve_at(now)
    }

    /// Reset a key after a successful reconcile.
    pub fn forget(&self, key: &K) {
        lock(&self.entries).remove(key);
    }

    /// Consecutive failures recorded for a key.
    #[must_use]
    pub fn failures(&self, key: &K) -> u32 {
        lock(&self.entries).get(key).map_or(0, |e| e.failures)
    }

    /// Number of keys with recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Drop entries whose last failure is older than `ttl`. Returns how many were dropped.
    pub fn gc(&self, ttl: Duration) -> usize {
        self.gc_at(ttl, Instant::now())
    }

    /// `gc` at an explicit instant.
    pub fn gc_at(&self, ttl: Duration, now: Instant) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.last_failure) <= ttl);
        before - entries.len()
    }

    fn reserve_at(&self, now: Instant) -> Duration {
        let burst = f64::from(self.config.burst);
        let frequency = self.config.frequency;
        let mut bucket = lock(&self.bucket);

        if now > bucket.last_refill {
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * frequency).min(burst);
            bucket.last_refill = now;
        }

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / frequency)
        }
    }
}
