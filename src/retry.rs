//! Backoff-based retry with per-key attempt serialization
//!
//! [`RetryCoordinator::with_retries`] wraps an async operation and retries
//! retryable failures with exponential backoff and jitter. Attempts for the
//! same key are serialized through a lazily created per-key lock, so at most
//! one attempt for a given key is ever in flight; the backoff sleep itself
//! happens outside the lock. Per-key [`RetryRecord`] history is diagnostic
//! only and never drives control decisions.

use crate::config::RetryConfig;
use crate::error::{CrawlError, ErrorKind};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (the first attempt counts)
    pub max_retries: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap on any computed backoff delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Relative jitter in [0, 1]; 0 makes delays deterministic
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            jitter: config.jitter,
        }
    }

    /// Computes the backoff delay after a failed attempt (1-indexed):
    /// `min(initial * factor^(attempt-1) * (1 ± jitter), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64()
            * self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let spread = if self.jitter > 0.0 {
            1.0 + self.jitter * (rand::random::<f64>() * 2.0 - 1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64(base * spread).min(self.max_delay)
    }

    /// The delay to apply after `err` on `attempt`.
    ///
    /// A rate-limit error carrying an explicit server hint overrides the
    /// backoff formula outright, uncapped.
    pub fn next_delay(&self, attempt: u32, err: &CrawlError) -> Duration {
        if err.kind == ErrorKind::RateLimit {
            if let Some(seconds) = err.retry_after {
                return Duration::from_secs(seconds);
            }
        }
        self.delay_for_attempt(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Diagnostic record of one failed, retried attempt
#[derive(Debug, Clone)]
pub struct RetryRecord {
    pub key: String,
    pub attempt: u32,
    pub kind: ErrorKind,
    pub message: String,
    pub delay: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Retry policy engine with per-key attempt serialization
pub struct RetryCoordinator {
    policy: RetryPolicy,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    records: std::sync::Mutex<HashMap<String, Vec<RetryRecord>>>,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            locks: std::sync::Mutex::new(HashMap::new()),
            records: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record(&self, key: &str, attempt: u32, err: &CrawlError, delay: Duration) {
        let record = RetryRecord {
            key: key.to_string(),
            attempt,
            kind: err.kind,
            message: err.message.clone(),
            delay,
            timestamp: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(record);
    }

    /// Retry history for a key, oldest first
    pub fn history(&self, key: &str) -> Vec<RetryRecord> {
        self.records
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Clears the retry history for one key
    pub fn clear_history(&self, key: &str) {
        self.records.lock().unwrap().remove(key);
    }

    /// Clears all per-key locks and history
    pub fn reset(&self) {
        self.locks.lock().unwrap().clear();
        self.records.lock().unwrap().clear();
    }

    /// Runs `operation` until it succeeds, its error is non-retryable, or
    /// `max_retries` attempts are exhausted.
    ///
    /// The last observed error is propagated unchanged, so callers can still
    /// branch on its kind after exhaustion.
    pub async fn with_retries<T, F, Fut>(&self, key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock = self.lock_for(key);
        let mut attempt: u32 = 1;

        loop {
            let result = {
                let _in_flight = lock.lock().await;
                operation().await
            };

            match result {
                Ok(value) => {
                    self.clear_history(key);
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= self.policy.max_retries || !err.retryable {
                        return Err(err);
                    }

                    let delay = self.policy.next_delay(attempt, &err);
                    self.record(key, attempt, &err, delay);
                    tracing::warn!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
