//! Persistence layer: snapshot store and its transactional write context.
//!
//! [`SnapshotStore`] exposes exactly the queries the indexing engine
//! needs; all writes for one churn go through a single
//! [`SnapshotTransaction`]. Dropping a transaction without calling
//! [`SnapshotTransaction::commit`] discards its writes, so every exit
//! path of a failed churn leaves no rows behind. Notifications are staged
//! in the same transaction and stay pending until delivered.
//!
//! Two implementations are provided: [`postgres::PostgresSnapshotStore`]
//! (`sqlx::PgPool`) and [`memory::MemorySnapshotStore`] for tests.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::BaseAmount;
use crate::error::IndexerError;

pub use memory::MemorySnapshotStore;
pub use models::{BondProviderRecord, NodeRecord, SnapshotRecord, StagedNotification};
pub use postgres::PostgresSnapshotStore;

/// Read access to indexed snapshots plus a transaction factory.
#[async_trait]
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Finds the snapshot at exactly `block_number`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn snapshot_at(&self, block_number: u64) -> Result<Option<SnapshotRecord>, IndexerError>;

    /// Returns the highest indexed `block_number`, if any snapshot exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn last_indexed_block(&self) -> Result<Option<u64>, IndexerError>;

    /// Opens a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if no transaction can be opened.
    async fn begin(&self) -> Result<Box<dyn SnapshotTransaction>, IndexerError>;

    /// Committed notifications not yet delivered, oldest churn first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn pending_notifications(&self) -> Result<Vec<StagedNotification>, IndexerError>;

    /// Removes a delivered notification.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn discard_notification(&self, id: Uuid) -> Result<(), IndexerError>;
}

/// All-or-nothing write context for one churn.
///
/// The `previous_*` lookups return the most recent row for the natural key
/// with `block_number` strictly below `before`, and only ever see
/// committed churns.
#[async_trait]
pub trait SnapshotTransaction: Send {
    /// Inserts the snapshot row.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`], including when a snapshot for
    /// the same height already exists.
    async fn insert_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<(), IndexerError>;

    /// Inserts a node row.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn insert_node(&mut self, node: &NodeRecord) -> Result<(), IndexerError>;

    /// Inserts a bond provider row.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn insert_bond_provider(
        &mut self,
        provider: &BondProviderRecord,
    ) -> Result<(), IndexerError>;

    /// Status of `node_address` at the latest height below `before`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn previous_node_status(
        &mut self,
        node_address: &str,
        before: u64,
    ) -> Result<Option<String>, IndexerError>;

    /// Bond of `(node_address, bond_provider_address)` at the latest height
    /// below `before`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn previous_bond_amount(
        &mut self,
        node_address: &str,
        bond_provider_address: &str,
        before: u64,
    ) -> Result<Option<BaseAmount>, IndexerError>;

    /// Records a notification to deliver once this transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] on store failure.
    async fn stage_notification(
        &mut self,
        notification: &StagedNotification,
    ) -> Result<(), IndexerError>;

    /// Makes every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the commit fails; nothing is
    /// written in that case.
    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the store reports a failure
    /// while rolling back.
    async fn rollback(self: Box<Self>) -> Result<(), IndexerError>;
}

/// Converts a height to the store's signed column type.
///
/// # Errors
///
/// Returns [`IndexerError::Persistence`] for heights above `i64::MAX`.
pub fn height_to_db(height: u64) -> Result<i64, IndexerError> {
    i64::try_from(height)
        .map_err(|_| IndexerError::Persistence(format!("block height {height} out of range")))
}

/// Converts a stored height back to `u64`.
///
/// # Errors
///
/// Returns [`IndexerError::Persistence`] for negative values.
pub fn height_from_db(height: i64) -> Result<u64, IndexerError> {
    u64::try_from(height)
        .map_err(|_| IndexerError::Persistence(format!("negative block height {height} in store")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_conversions_are_checked() {
        assert_eq!(height_to_db(42).ok(), Some(42));
        assert!(height_to_db(u64::MAX).is_err());
        assert_eq!(height_from_db(42).ok(), Some(42));
        assert!(height_from_db(-1).is_err());
    }
}
