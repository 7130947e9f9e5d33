//! Admission gate for decode work shared by both loader lanes.
//!
//! Waiting for a permit is an async suspension on a `tokio` semaphore, so a
//! background request waiting its turn never parks a thread that the
//! interactive lane could use.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Counting limiter over a shared semaphore. Clones share the same permits.
#[derive(Debug, Clone)]
pub struct TaskLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of capacity. The slot is released when the permit is dropped.
///
/// Leaking a permit (e.g. with `std::mem::forget`) loses that slot for the
/// lifetime of the limiter.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl TaskLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until fewer than `capacity` permits are held.
    pub async fn acquire(&self) -> Result<Permit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .context("Task limiter closed")?;
        trace!(in_flight = self.in_flight(), "Acquired decode permit");
        Ok(Permit { _permit: permit })
    }

    /// Runs `work` while holding a permit.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(work.await)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
