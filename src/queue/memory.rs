//! In-memory queue that records jobs, for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::NotificationQueue;
use crate::domain::NotificationJob;
use crate::error::IndexerError;

/// Records every accepted job. Can be switched to reject jobs.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotificationQueue {
    jobs: Arc<Mutex<Vec<NotificationJob>>>,
    rejecting: Arc<AtomicBool>,
}

impl MemoryNotificationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later `enqueue` calls fail (or succeed again).
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Snapshot of accepted jobs, in enqueue order.
    #[must_use]
    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationQueue for MemoryNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), IndexerError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(IndexerError::NotificationDispatch(
                "queue rejecting jobs".to_string(),
            ));
        }
        self.jobs
            .lock()
            .map_err(|_| IndexerError::NotificationDispatch("queue lock poisoned".to_string()))?
            .push(job.clone());
        Ok(())
    }
}
