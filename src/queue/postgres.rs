//! Outbox-table queue: jobs are appended to `notification_jobs` for the
//! delivery worker to pick up.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::NotificationQueue;
use crate::domain::NotificationJob;
use crate::error::IndexerError;

/// [`NotificationQueue`] writing into the `notification_jobs` table.
#[derive(Debug, Clone)]
pub struct PostgresNotificationQueue {
    pool: PgPool,
}

impl PostgresNotificationQueue {
    /// Creates a queue on the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationQueue for PostgresNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), IndexerError> {
        let payload = serde_json::to_value(&job.payload)
            .map_err(|e| IndexerError::NotificationDispatch(format!("encode payload: {e}")))?;

        sqlx::query(
            "INSERT INTO notification_jobs (id, observable_address, job_type, payload) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(&job.observable_address)
        .bind(job.kind.as_str())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::NotificationDispatch(e.to_string()))?;

        Ok(())
    }
}
