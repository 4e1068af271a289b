//! Bounded-parallelism admission gate
//!
//! Wraps a tokio semaphore, which queues waiters in FIFO order, so callers
//! that arrive while the gate is full are admitted in arrival order.

use crate::error::{CrawlError, ErrorKind};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permission to run one unit of work
///
/// The slot is returned to the gate when dropped, on every exit path.
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Bounds the number of simultaneously in-flight operations
pub struct Gate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Gate {
    /// Creates a gate admitting at most `capacity` concurrent holders.
    ///
    /// `capacity` must be positive; the config validation layer enforces
    /// this before a gate is ever constructed.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Acquires a slot, suspending in FIFO order while the gate is full
    pub async fn acquire(&self) -> Result<Slot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::new(ErrorKind::Queue, "concurrency gate is closed"))?;

        Ok(Slot { _permit: permit })
    }

    /// Suspends until every held slot has been released.
    ///
    /// Implemented by acquiring the gate's full capacity, so callers queued
    /// behind a drain are admitted only after the batch boundary passes.
    pub async fn drain(&self) -> Result<()> {
        let permit = self
            .semaphore
            .acquire_many(self.capacity as u32)
            .await
            .map_err(|_| CrawlError::new(ErrorKind::Queue, "concurrency gate is closed"))?;
        drop(permit);
        Ok(())
    }

    /// Number of slots currently held
    pub fn held(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Maximum number of concurrent holders
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
