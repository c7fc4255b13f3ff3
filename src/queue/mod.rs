//! Notification queue primitive.
//!
//! The indexer only enqueues; rendering and delivery belong to an external
//! worker. [`NotificationQueue::enqueue`] is fire-and-forget: success means
//! the job was accepted, and no response payload is consumed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::NotificationJob;
use crate::error::IndexerError;

pub use memory::MemoryNotificationQueue;
pub use postgres::PostgresNotificationQueue;

/// Accepts notification jobs for later delivery.
#[async_trait]
pub trait NotificationQueue: Send + Sync + std::fmt::Debug {
    /// Hands one job to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::NotificationDispatch`] if the job is rejected.
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), IndexerError>;
}
