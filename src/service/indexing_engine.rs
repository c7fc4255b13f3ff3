//! Indexing engine: turns one churn into a persisted snapshot plus
//! bond-provider notifications, and sweeps historical churns.
//!
//! Per churn the engine moves through
//! `Discovered → Fetching → Diffing → Persisting → NotificationsEmitted`,
//! short-circuiting to `AlreadyIndexed` when a snapshot for the height
//! exists. Each step is awaited to completion before the next starts;
//! there is no overlap between churns.
//!
//! Notification jobs are staged in the churn's transaction and delivered
//! after commit. A job the queue rejects stays staged and is retried at
//! the start of every later [`IndexingEngine::index_churn`] call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::churn_diff::{bond_change_due, status_change_details, status_change_due};
use super::notification_dispatcher::NotificationDispatcher;
use crate::domain::node_state::{total_active_bond, total_active_earnings};
use crate::domain::{NodeState, NotificationJob};
use crate::error::IndexerError;
use crate::persistence::{
    BondProviderRecord, NodeRecord, SnapshotRecord, SnapshotStore, SnapshotTransaction,
    StagedNotification,
};
use crate::upstream::{ChurnDiscovery, NodeStateFetcher};

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Blocks before the churn to read earnings and aggregates from.
    pub pre_churn_offset: u64,
    /// Blocks after the churn to read status, bond and providers from.
    pub post_churn_offset: u64,
    /// Backfill skips churns at or below this height.
    pub min_backfill_height: u64,
    /// Pause after each committed churn.
    pub settle_delay: Duration,
    /// Pause after a failed churn during backfill.
    pub failure_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pre_churn_offset: 100,
            post_churn_offset: 100,
            min_backfill_height: 0,
            settle_delay: Duration::from_millis(2000),
            failure_backoff: Duration::from_millis(4000),
        }
    }
}

/// Counts for one indexed churn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Churn height.
    pub block_number: u64,
    /// Node rows written.
    pub nodes_written: usize,
    /// Bond provider rows written.
    pub bond_providers_written: usize,
    /// Pre-churn nodes absent after the churn.
    pub nodes_dropped: usize,
    /// Notifications decided for this churn.
    pub notifications: usize,
}

/// Result of [`IndexingEngine::index_churn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChurnOutcome {
    /// A snapshot already existed; nothing was done.
    AlreadyIndexed,
    /// The churn was written and its notifications dispatched.
    Indexed(IndexReport),
}

/// Terminal report of a backfill sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Churns newly indexed.
    pub indexed: usize,
    /// Churns below the floor or already indexed.
    pub skipped: usize,
    /// Churns that failed.
    pub failed: usize,
}

/// Orchestrates discovery, fetch, diff, persistence and notifications.
#[derive(Debug, Clone)]
pub struct IndexingEngine {
    churns: Arc<dyn ChurnDiscovery>,
    nodes: Arc<dyn NodeStateFetcher>,
    store: Arc<dyn SnapshotStore>,
    notifier: NotificationDispatcher,
    settings: EngineSettings,
}

impl IndexingEngine {
    /// Creates an engine from its collaborators.
    #[must_use]
    pub fn new(
        churns: Arc<dyn ChurnDiscovery>,
        nodes: Arc<dyn NodeStateFetcher>,
        store: Arc<dyn SnapshotStore>,
        notifier: NotificationDispatcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            churns,
            nodes,
            store,
            notifier,
            settings,
        }
    }

    /// Indexes the most recent churn reported upstream.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::NoChurns`] when upstream lists none, and any
    /// error from [`Self::index_churn`].
    pub async fn index_latest_churn(&self) -> Result<ChurnOutcome, IndexerError> {
        tracing::info!("fetching latest churn");
        let churn = self
            .churns
            .latest_churn()
            .await?
            .ok_or(IndexerError::NoChurns)?;
        tracing::info!(block_number = churn.height, "latest churn found");
        self.index_churn(churn.height, churn.timestamp).await
    }

    /// Indexes the churn at `block_number`.
    ///
    /// Safe to call repeatedly: a height that already has a snapshot returns
    /// [`ChurnOutcome::AlreadyIndexed`] without touching upstream. Staged
    /// notifications left over from earlier calls are delivered first.
    ///
    /// # Errors
    ///
    /// - [`IndexerError::UpstreamUnavailable`] / [`IndexerError::InvalidUpstreamData`]
    ///   from either node-state fetch; nothing is written.
    /// - [`IndexerError::Persistence`] from the store; the transaction is
    ///   rolled back and no row for the height remains.
    /// - [`IndexerError::NotificationDispatch`] when a job could not be
    ///   queued; the rows stay committed and the job stays staged.
    pub async fn index_churn(
        &self,
        block_number: u64,
        block_time: DateTime<Utc>,
    ) -> Result<ChurnOutcome, IndexerError> {
        if let Err(e) = self.deliver_pending().await {
            tracing::warn!(
                block_number,
                error = %e,
                code = e.error_code(),
                "staged notifications not delivered"
            );
        }

        if self.store.snapshot_at(block_number).await?.is_some() {
            tracing::info!(block_number, "churn already indexed, skipping");
            return Ok(ChurnOutcome::AlreadyIndexed);
        }

        let pre_height = block_number.saturating_sub(self.settings.pre_churn_offset);
        let post_height = block_number.saturating_add(self.settings.post_churn_offset);
        tracing::info!(block_number, pre_height, post_height, "fetching node state");

        let pre = self.nodes.nodes_at(pre_height).await?;
        let post = self.nodes.nodes_at(post_height).await?;
        tracing::info!(
            block_number,
            pre_nodes = pre.len(),
            post_nodes = post.len(),
            "node state fetched"
        );

        let snapshot = SnapshotRecord {
            id: Uuid::new_v4(),
            block_number,
            block_timestamp: block_time,
            total_active_bond: total_active_bond(&pre),
            total_earnings: Some(total_active_earnings(&pre)),
        };
        tracing::info!(
            block_number,
            total_active_bond = %snapshot.total_active_bond,
            total_earnings = %total_active_earnings(&pre),
            "aggregates computed"
        );

        let mut tx = self.store.begin().await?;
        let report = match self.write_churn(tx.as_mut(), &snapshot, &pre, &post).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(block_number, error = %rollback_err, "rollback failed");
                }
                tracing::error!(
                    block_number,
                    error = %e,
                    code = e.error_code(),
                    "churn indexing failed"
                );
                return Err(e);
            }
        };
        tx.commit().await.inspect_err(|e| {
            tracing::error!(block_number, error = %e, "commit failed");
        })?;
        tracing::info!(
            block_number,
            nodes = report.nodes_written,
            bond_providers = report.bond_providers_written,
            notifications = report.notifications,
            "snapshot committed"
        );

        let delivered = self.deliver_pending().await;

        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        delivered.map(|_| ChurnOutcome::Indexed(report))
    }

    /// Writes the snapshot, node and bond provider rows for one churn and
    /// stages its notifications, all inside `tx`.
    async fn write_churn(
        &self,
        tx: &mut dyn SnapshotTransaction,
        snapshot: &SnapshotRecord,
        pre: &[NodeState],
        post: &[NodeState],
    ) -> Result<IndexReport, IndexerError> {
        let block_number = snapshot.block_number;
        let mut report = IndexReport {
            block_number,
            ..IndexReport::default()
        };
        let mut jobs: Vec<NotificationJob> = Vec::new();

        tx.insert_snapshot(snapshot).await?;

        let after: HashMap<&str, &NodeState> = post
            .iter()
            .map(|n| (n.node_address.as_str(), n))
            .collect();

        for before in pre {
            let Some(current) = after.get(before.node_address.as_str()).copied() else {
                tracing::warn!(
                    block_number,
                    node_address = %before.node_address,
                    "node not found after churn, skipping"
                );
                report.nodes_dropped += 1;
                continue;
            };

            let previous_status = tx
                .previous_node_status(&current.node_address, block_number)
                .await?;

            let node = NodeRecord {
                id: Uuid::new_v4(),
                snapshot_id: snapshot.id,
                block_number,
                node_address: current.node_address.clone(),
                total_bond: current.total_bond,
                earnings: before.current_award,
                status: current.status.clone(),
            };
            tx.insert_node(&node).await?;
            report.nodes_written += 1;

            for provider in &current.bond_providers {
                let previous_bond = tx
                    .previous_bond_amount(
                        &current.node_address,
                        &provider.bond_provider_address,
                        block_number,
                    )
                    .await?;

                tx.insert_bond_provider(&BondProviderRecord {
                    id: Uuid::new_v4(),
                    node_id: node.id,
                    block_number,
                    node_address: current.node_address.clone(),
                    bond_provider_address: provider.bond_provider_address.clone(),
                    bond_amount: provider.bond_amount,
                })
                .await?;
                report.bond_providers_written += 1;

                if let Some(previous) = previous_status.as_deref()
                    && status_change_due(Some(previous), &current.status, provider.bond_amount)
                {
                    tracing::debug!(
                        block_number,
                        node_address = %current.node_address,
                        bond_provider = %provider.bond_provider_address,
                        previous,
                        status = %current.status,
                        "status change notification due"
                    );
                    let details = status_change_details(previous, &current.status, block_number);
                    jobs.push(NotificationJob::new(
                        provider.bond_provider_address.clone(),
                        self.notifier.node_status_changed(
                            &current.node_address,
                            &current.status,
                            Some(details),
                        ),
                    ));
                }

                if let Some((previous_balance, new_balance)) =
                    bond_change_due(&current.status, previous_bond, provider.bond_amount)
                {
                    tracing::debug!(
                        block_number,
                        node_address = %current.node_address,
                        bond_provider = %provider.bond_provider_address,
                        previous_balance,
                        new_balance,
                        "bond change notification due"
                    );
                    jobs.push(NotificationJob::new(
                        provider.bond_provider_address.clone(),
                        self.notifier.node_churn(
                            &provider.bond_provider_address,
                            &current.node_address,
                            previous_balance,
                            new_balance,
                        ),
                    ));
                }
            }
        }

        report.notifications = jobs.len();
        if self.notifier.is_enabled() {
            for job in jobs {
                tx.stage_notification(&StagedNotification {
                    id: Uuid::new_v4(),
                    block_number,
                    job,
                })
                .await?;
            }
        }
        Ok(report)
    }

    /// Delivers every staged notification, oldest churn first.
    ///
    /// Delivered jobs are removed from the store. Rejected ones stay staged
    /// for the next call. All jobs are attempted before failures are
    /// reported.
    async fn deliver_pending(&self) -> Result<usize, IndexerError> {
        if !self.notifier.is_enabled() {
            return Ok(0);
        }

        let pending = self.store.pending_notifications().await?;
        let total = pending.len();
        let mut failed = 0usize;
        for staged in pending {
            match self.notifier.deliver(&staged.job).await {
                Ok(()) => self.store.discard_notification(staged.id).await?,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        block_number = staged.block_number,
                        notification_id = %staged.id,
                        error = %e,
                        "notification kept for redelivery"
                    );
                }
            }
        }

        if failed > 0 {
            return Err(IndexerError::NotificationDispatch(format!(
                "{failed} of {total} staged notifications could not be queued"
            )));
        }
        if total > 0 {
            tracing::info!(delivered = total, "staged notifications delivered");
        }
        Ok(total)
    }

    /// Indexes every churn upstream knows about that has no snapshot yet,
    /// in ascending height order.
    ///
    /// A failing churn is logged, counted and followed by a backoff; the
    /// sweep then continues with the next one.
    ///
    /// # Errors
    ///
    /// Only fails when the churn list itself or the last-indexed lookup
    /// cannot be fetched.
    pub async fn backfill_churns(&self) -> Result<BackfillSummary, IndexerError> {
        tracing::info!("starting churn backfill");
        let last_indexed = self.store.last_indexed_block().await?;
        tracing::info!(last_indexed_block = ?last_indexed, "backfill starting point");

        let mut churns = self.churns.list_churns().await?;
        churns.sort_by_key(|c| c.height);
        churns.dedup_by_key(|c| c.height);
        tracing::info!(count = churns.len(), "churns to consider");

        let floor = self.settings.min_backfill_height;
        let mut summary = BackfillSummary::default();

        for churn in churns {
            if churn.height <= floor {
                tracing::warn!(
                    block_number = churn.height,
                    min_height = floor,
                    "churn below minimum backfill height, an archive node is required to index it"
                );
                summary.skipped += 1;
                continue;
            }

            match self.index_churn(churn.height, churn.timestamp).await {
                Ok(ChurnOutcome::AlreadyIndexed) => summary.skipped += 1,
                Ok(ChurnOutcome::Indexed(_)) => summary.indexed += 1,
                Err(e) if e.rows_committed() => {
                    tracing::warn!(
                        block_number = churn.height,
                        error = %e,
                        "churn indexed with notification failures"
                    );
                    summary.indexed += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        block_number = churn.height,
                        error = %e,
                        code = e.error_code(),
                        "failed to index churn, continuing with next"
                    );
                    if !self.settings.failure_backoff.is_zero() {
                        tokio::time::sleep(self.settings.failure_backoff).await;
                    }
                }
            }
        }

        tracing::info!(
            indexed = summary.indexed,
            skipped = summary.skipped,
            failed = summary.failed,
            "backfill completed"
        );
        if summary.failed > 0 {
            tracing::warn!(failed = summary.failed, "some churns failed to index");
        }
        Ok(summary)
    }
}
