//! In-memory snapshot store.
//!
//! Holds committed rows in RAM and buffers each transaction's writes
//! until commit. Lookups inside a transaction see committed rows only.
//! Useful for tests and dry runs; all data is lost when the process exits.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use uuid::Uuid;

use super::models::{BondProviderRecord, NodeRecord, SnapshotRecord, StagedNotification};
use super::{SnapshotStore, SnapshotTransaction};
use crate::domain::BaseAmount;
use crate::error::IndexerError;

#[derive(Debug, Default, Clone)]
struct Tables {
    snapshots: Vec<SnapshotRecord>,
    nodes: Vec<NodeRecord>,
    bond_providers: Vec<BondProviderRecord>,
    staged: Vec<StagedNotification>,
}

impl Tables {
    fn has_snapshot(&self, block_number: u64) -> bool {
        self.snapshots.iter().any(|s| s.block_number == block_number)
    }
}

/// In-memory [`SnapshotStore`].
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Default, Clone)]
pub struct MemorySnapshotStore {
    tables: Arc<Mutex<Tables>>,
    failing_node: Arc<Mutex<Option<String>>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `insert_node` for `node_address` fail, to exercise
    /// rollback paths.
    pub fn fail_node_inserts_for(&self, node_address: impl Into<String>) {
        if let Ok(mut failing) = self.failing_node.lock() {
            *failing = Some(node_address.into());
        }
    }

    /// Clears a failure set by [`Self::fail_node_inserts_for`].
    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_node.lock() {
            *failing = None;
        }
    }

    /// All committed snapshots, in insertion order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.tables
            .lock()
            .map(|t| t.snapshots.clone())
            .unwrap_or_default()
    }

    /// Committed node rows at `block_number`.
    #[must_use]
    pub fn nodes_at(&self, block_number: u64) -> Vec<NodeRecord> {
        self.tables
            .lock()
            .map(|t| {
                t.nodes
                    .iter()
                    .filter(|n| n.block_number == block_number)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Committed bond provider rows at `block_number`.
    #[must_use]
    pub fn bond_providers_at(&self, block_number: u64) -> Vec<BondProviderRecord> {
        self.tables
            .lock()
            .map(|t| {
                t.bond_providers
                    .iter()
                    .filter(|p| p.block_number == block_number)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock_tables(&self) -> Result<MutexGuard<'_, Tables>, IndexerError> {
        lock(&self.tables)
    }
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, IndexerError> {
    tables
        .lock()
        .map_err(|_| IndexerError::Persistence("memory store lock poisoned".to_string()))
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn snapshot_at(&self, block_number: u64) -> Result<Option<SnapshotRecord>, IndexerError> {
        Ok(self
            .lock_tables()?
            .snapshots
            .iter()
            .find(|s| s.block_number == block_number)
            .cloned())
    }

    async fn last_indexed_block(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self
            .lock_tables()?
            .snapshots
            .iter()
            .map(|s| s.block_number)
            .max())
    }

    async fn begin(&self) -> Result<Box<dyn SnapshotTransaction>, IndexerError> {
        let failing_node = self
            .failing_node
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            pending: Tables::default(),
            failing_node,
        }))
    }

    async fn pending_notifications(&self) -> Result<Vec<StagedNotification>, IndexerError> {
        let mut pending = self.lock_tables()?.staged.clone();
        pending.sort_by_key(|n| n.block_number);
        Ok(pending)
    }

    async fn discard_notification(&self, id: Uuid) -> Result<(), IndexerError> {
        self.lock_tables()?.staged.retain(|n| n.id != id);
        Ok(())
    }
}

/// Buffered writes of one in-memory transaction. Dropping it discards them.
#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    pending: Tables,
    failing_node: Option<String>,
}

#[async_trait]
impl SnapshotTransaction for MemoryTransaction {
    async fn insert_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<(), IndexerError> {
        let exists = lock(&self.tables)?.has_snapshot(snapshot.block_number)
            || self.pending.has_snapshot(snapshot.block_number);
        if exists {
            return Err(IndexerError::Persistence(format!(
                "duplicate snapshot for block {}",
                snapshot.block_number
            )));
        }
        self.pending.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn insert_node(&mut self, node: &NodeRecord) -> Result<(), IndexerError> {
        if self.failing_node.as_deref() == Some(node.node_address.as_str()) {
            return Err(IndexerError::Persistence(format!(
                "injected failure for node {}",
                node.node_address
            )));
        }
        self.pending.nodes.push(node.clone());
        Ok(())
    }

    async fn insert_bond_provider(
        &mut self,
        provider: &BondProviderRecord,
    ) -> Result<(), IndexerError> {
        self.pending.bond_providers.push(provider.clone());
        Ok(())
    }

    async fn stage_notification(
        &mut self,
        notification: &StagedNotification,
    ) -> Result<(), IndexerError> {
        self.pending.staged.push(notification.clone());
        Ok(())
    }

    async fn previous_node_status(
        &mut self,
        node_address: &str,
        before: u64,
    ) -> Result<Option<String>, IndexerError> {
        Ok(lock(&self.tables)?
            .nodes
            .iter()
            .filter(|n| n.node_address == node_address && n.block_number < before)
            .max_by_key(|n| n.block_number)
            .map(|n| n.status.clone()))
    }

    async fn previous_bond_amount(
        &mut self,
        node_address: &str,
        bond_provider_address: &str,
        before: u64,
    ) -> Result<Option<BaseAmount>, IndexerError> {
        Ok(lock(&self.tables)?
            .bond_providers
            .iter()
            .filter(|p| {
                p.node_address == node_address
                    && p.bond_provider_address == bond_provider_address
                    && p.block_number < before
            })
            .max_by_key(|p| p.block_number)
            .map(|p| p.bond_amount))
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let Self { tables, pending, .. } = *self;
        let mut committed = lock(&tables)?;
        if let Some(dup) = pending
            .snapshots
            .iter()
            .find(|s| committed.has_snapshot(s.block_number))
        {
            return Err(IndexerError::Persistence(format!(
                "duplicate snapshot for block {}",
                dup.block_number
            )));
        }
        committed.snapshots.extend(pending.snapshots);
        committed.nodes.extend(pending.nodes);
        committed.bond_providers.extend(pending.bond_providers);
        committed.staged.extend(pending.staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        Ok(())
    }
}
