//! PostgreSQL implementation of the snapshot store.
//!
//! Amounts live in `NUMERIC` columns. They are bound as text and cast
//! server-side, and read back through `::text`, so base-unit values never
//! pass through a floating-point type.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{BondProviderRecord, NodeRecord, SnapshotRecord, StagedNotification};
use super::{SnapshotStore, SnapshotTransaction, height_from_db, height_to_db};
use crate::domain::{BaseAmount, NotificationJob};
use crate::error::IndexerError;

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum idle connections.
    pub min_connections: u32,
    /// Timeout for acquiring a connection.
    pub acquire_timeout: Duration,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// PostgreSQL-backed [`SnapshotStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    /// Connects a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if the database is unreachable.
    pub async fn connect(database_url: &str, opts: &PostgresOptions) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(opts.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| IndexerError::Persistence(format!("postgres connect: {e}")))?;
        tracing::info!("database connection established");
        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), IndexerError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Latest status of a node strictly before a height.
const PREVIOUS_STATUS_SQL: &str = "SELECT status FROM node \
     WHERE node_address = $1 AND block_number < $2 \
     ORDER BY block_number DESC LIMIT 1";

/// Latest bond of a provider on a node strictly before a height.
const PREVIOUS_BOND_SQL: &str = "SELECT bond_amount::text FROM bond_provider \
     WHERE node_address = $1 AND bond_provider_address = $2 AND block_number < $3 \
     ORDER BY block_number DESC LIMIT 1";

/// Parses a `NUMERIC::text` column into a base-unit amount.
fn amount_from_db(text: &str) -> Result<BaseAmount, IndexerError> {
    // Legacy rows may carry a `.0` scale.
    let integral = text.split('.').next().unwrap_or(text);
    integral
        .parse()
        .map_err(|_| IndexerError::Persistence(format!("invalid stored amount {text:?}")))
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn snapshot_at(&self, block_number: u64) -> Result<Option<SnapshotRecord>, IndexerError> {
        let row = sqlx::query_as::<_, (Uuid, i64, DateTime<Utc>, String, Option<String>)>(
            "SELECT id, block_number, block_timestamp, \
                    total_active_bond::text, total_earnings::text \
             FROM snapshot WHERE block_number = $1",
        )
        .bind(height_to_db(block_number)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(id, block_number, block_timestamp, total_active_bond, total_earnings)| {
                Ok(SnapshotRecord {
                    id,
                    block_number: height_from_db(block_number)?,
                    block_timestamp,
                    total_active_bond: amount_from_db(&total_active_bond)?,
                    total_earnings: total_earnings.as_deref().map(amount_from_db).transpose()?,
                })
            },
        )
        .transpose()
    }

    async fn last_indexed_block(&self) -> Result<Option<u64>, IndexerError> {
        let height = sqlx::query_scalar::<_, i64>(
            "SELECT block_number FROM snapshot ORDER BY block_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        height.map(height_from_db).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn SnapshotTransaction>, IndexerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn pending_notifications(&self) -> Result<Vec<StagedNotification>, IndexerError> {
        let rows = sqlx::query_as::<_, (Uuid, i64, serde_json::Value)>(
            "SELECT id, block_number, job FROM pending_notification \
             ORDER BY block_number ASC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, block_number, job)| -> Result<StagedNotification, IndexerError> {
                let job: NotificationJob = serde_json::from_value(job).map_err(|e| {
                    IndexerError::Persistence(format!("invalid staged notification {id}: {e}"))
                })?;
                Ok(StagedNotification {
                    id,
                    block_number: height_from_db(block_number)?,
                    job,
                })
            })
            .collect()
    }

    async fn discard_notification(&self, id: Uuid) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM pending_notification WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// One open database transaction. Rolled back by `sqlx` when dropped
/// uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl SnapshotTransaction for PostgresTransaction {
    async fn insert_snapshot(&mut self, snapshot: &SnapshotRecord) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO snapshot \
             (id, block_number, block_timestamp, total_active_bond, total_earnings) \
             VALUES ($1, $2, $3, $4::numeric, $5::numeric)",
        )
        .bind(snapshot.id)
        .bind(height_to_db(snapshot.block_number)?)
        .bind(snapshot.block_timestamp)
        .bind(snapshot.total_active_bond.to_string())
        .bind(snapshot.total_earnings.map(|e| e.to_string()))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_node(&mut self, node: &NodeRecord) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO node \
             (id, snapshot_id, block_number, node_address, total_bond, earnings, status) \
             VALUES ($1, $2, $3, $4, $5::numeric, $6::numeric, $7)",
        )
        .bind(node.id)
        .bind(node.snapshot_id)
        .bind(height_to_db(node.block_number)?)
        .bind(&node.node_address)
        .bind(node.total_bond.to_string())
        .bind(node.earnings.to_string())
        .bind(&node.status)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_bond_provider(
        &mut self,
        provider: &BondProviderRecord,
    ) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO bond_provider \
             (id, node_id, block_number, node_address, bond_provider_address, bond_amount) \
             VALUES ($1, $2, $3, $4, $5, $6::numeric)",
        )
        .bind(provider.id)
        .bind(provider.node_id)
        .bind(height_to_db(provider.block_number)?)
        .bind(&provider.node_address)
        .bind(&provider.bond_provider_address)
        .bind(provider.bond_amount.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn stage_notification(
        &mut self,
        notification: &StagedNotification,
    ) -> Result<(), IndexerError> {
        let job = serde_json::to_value(&notification.job)
            .map_err(|e| IndexerError::Persistence(format!("encode notification: {e}")))?;
        sqlx::query(
            "INSERT INTO pending_notification (id, block_number, job) VALUES ($1, $2, $3)",
        )
        .bind(notification.id)
        .bind(height_to_db(notification.block_number)?)
        .bind(&job)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn previous_node_status(
        &mut self,
        node_address: &str,
        before: u64,
    ) -> Result<Option<String>, IndexerError> {
        let status = sqlx::query_scalar::<_, String>(PREVIOUS_STATUS_SQL)
        .bind(node_address)
        .bind(height_to_db(before)?)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(status)
    }

    async fn previous_bond_amount(
        &mut self,
        node_address: &str,
        bond_provider_address: &str,
        before: u64,
    ) -> Result<Option<BaseAmount>, IndexerError> {
        let amount = sqlx::query_scalar::<_, String>(PREVIOUS_BOND_SQL)
        .bind(node_address)
        .bind(bond_provider_address)
        .bind(height_to_db(before)?)
        .fetch_optional(&mut *self.tx)
        .await?;
        amount.as_deref().map(amount_from_db).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let Self { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        let Self { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn stored_amounts_parse_with_or_without_scale() {
        assert_eq!(amount_from_db("150000000000").ok(), Some(BaseAmount::new(150_000_000_000)));
        assert_eq!(amount_from_db("42.0").ok(), Some(BaseAmount::new(42)));
        assert!(amount_from_db("abc").is_err());
    }

    #[test]
    fn previous_lookups_are_strictly_earlier_and_newest_first() {
        for sql in [PREVIOUS_STATUS_SQL, PREVIOUS_BOND_SQL] {
            assert!(sql.contains("block_number < $"));
            assert!(!sql.contains("block_number <="));
            assert!(sql.ends_with("ORDER BY block_number DESC LIMIT 1"));
        }
        assert!(PREVIOUS_BOND_SQL.contains("bond_provider_address = $2"));
    }

    #[test]
    fn legacy_snapshots_get_zero_earnings_when_no_node_was_active() {
        let migration = include_str!("../../migrations/20240101000002_snapshot_total_earnings.sql");
        assert!(migration.contains("COALESCE(SUM(n.earnings), 0)"));
        assert!(migration.contains("WHERE n.snapshot_id = s.id"));
        assert!(migration.contains("WHERE s.total_earnings IS NULL"));
    }

    async fn commit_churn(
        store: &PostgresSnapshotStore,
        block_number: u64,
        node_address: &str,
        status: &str,
        bond: u128,
    ) -> Uuid {
        let snapshot = SnapshotRecord {
            id: Uuid::new_v4(),
            block_number,
            block_timestamp: Utc::now(),
            total_active_bond: BaseAmount::new(bond),
            total_earnings: Some(BaseAmount::ZERO),
        };
        let node = NodeRecord {
            id: Uuid::new_v4(),
            snapshot_id: snapshot.id,
            block_number,
            node_address: node_address.to_string(),
            total_bond: BaseAmount::new(bond),
            earnings: BaseAmount::ZERO,
            status: status.to_string(),
        };
        let provider = BondProviderRecord {
            id: Uuid::new_v4(),
            node_id: node.id,
            block_number,
            node_address: node_address.to_string(),
            bond_provider_address: "thor1provider".to_string(),
            bond_amount: BaseAmount::new(bond),
        };

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        assert!(tx.insert_snapshot(&snapshot).await.is_ok());
        assert!(tx.insert_node(&node).await.is_ok());
        assert!(tx.insert_bond_provider(&provider).await.is_ok());
        assert!(tx.commit().await.is_ok());
        snapshot.id
    }

    /// Needs a disposable database in `TEST_DATABASE_URL`.
    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn temporal_lookups_against_postgres() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            panic!("TEST_DATABASE_URL not set");
        };
        let Ok(store) = PostgresSnapshotStore::connect(&url, &PostgresOptions::default()).await
        else {
            panic!("connect failed");
        };
        assert!(store.migrate().await.is_ok());

        let node_address = format!("thor1{}", Uuid::new_v4().simple());
        let base = u64::from(Uuid::new_v4().as_fields().0) * 100 + 1_000_000_000;
        let mut snapshots = Vec::new();
        let history = [(10, "Standby", 1_000), (20, "Ready", 2_000), (30, "Active", 3_000)];
        for (offset, status, bond) in history {
            snapshots.push(commit_churn(&store, base + offset, &node_address, status, bond).await);
        }

        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let status = tx.previous_node_status(&node_address, base + 30).await;
        assert_eq!(status.ok(), Some(Some("Ready".to_string())));
        let none = tx.previous_node_status(&node_address, base + 10).await;
        assert_eq!(none.ok(), Some(None));
        let bond = tx
            .previous_bond_amount(&node_address, "thor1provider", base + 30)
            .await;
        assert_eq!(bond.ok(), Some(Some(BaseAmount::new(2_000))));
        assert!(tx.rollback().await.is_ok());

        for id in snapshots {
            let deleted = sqlx::query("DELETE FROM snapshot WHERE id = $1")
                .bind(id)
                .execute(store.pool())
                .await;
            assert!(deleted.is_ok());
        }
        store.close().await;
    }
}
