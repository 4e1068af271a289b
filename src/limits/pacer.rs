//! Minimum inter-request spacing
//!
//! A leaky-bucket-of-one: each permitted operation reserves the next free
//! instant at least `1s / requests-per-second` after the previous one, then
//! sleeps until its reservation comes up. Reservation happens under a short
//! lock; the sleep itself does not hold it, so concurrent callers queue up
//! spaced slots instead of serializing their sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a process-wide minimum spacing between operations
pub struct Pacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    request_count: AtomicU64,
}

impl Pacer {
    /// Creates a pacer allowing `requests_per_second` operations per second.
    ///
    /// The rate must be positive; the config validation layer enforces this.
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(1.0 / requests_per_second),
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    /// Waits until the minimum spacing since the previous operation has
    /// elapsed, then records this operation
    pub async fn pace(&self) {
        let deadline = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let deadline = match *last {
                Some(prev) => (prev + self.min_interval).max(now),
                None => now,
            };
            *last = Some(deadline);
            deadline
        };

        tokio::time::sleep_until(deadline).await;
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of operations paced so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Minimum spacing between consecutive operations
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Clears the last-request stamp and counter
    pub async fn reset(&self) {
        *self.last_request.lock().await = None;
        self.request_count.store(0, Ordering::Relaxed);
    }
}
