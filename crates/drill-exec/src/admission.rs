//! Process-wide admission control: a bounded number of concurrently
//! running executions with FIFO queueing of the rest.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded concurrency gate shared by every driver.
///
/// The underlying semaphore is fair: queued acquisitions are granted in
/// arrival order, so executions started earlier are admitted earlier.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Wait for an admission slot. Returns `None` when the execution is
    /// cancelled while queued. The permit releases its slot on drop, so
    /// holding it in the driver guarantees release on every exit path.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
