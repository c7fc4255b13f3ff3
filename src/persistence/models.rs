//! Database rows for snapshots, nodes and bond providers.
//!
//! Plain records with no persistence behaviour. Ownership runs
//! `Snapshot 1 → N Node 1 → N BondProvider` via the `*_id` fields;
//! `block_number` is denormalized onto every row for as-of queries.
//! [`StagedNotification`] rows are written with their churn and removed
//! once the job reaches the notification queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BaseAmount, NotificationJob};

/// A row from the `snapshot` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Row ID.
    pub id: Uuid,
    /// Churn height; unique across the table.
    pub block_number: u64,
    /// Churn block time.
    pub block_timestamp: DateTime<Utc>,
    /// Sum of Active node bonds at the pre-churn height.
    pub total_active_bond: BaseAmount,
    /// Sum of Active node awards at the pre-churn height; `None` on legacy rows.
    pub total_earnings: Option<BaseAmount>,
}

/// A row from the `node` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Row ID.
    pub id: Uuid,
    /// Owning snapshot.
    pub snapshot_id: Uuid,
    /// Churn height.
    pub block_number: u64,
    /// Validator address.
    pub node_address: String,
    /// Post-churn total bond.
    pub total_bond: BaseAmount,
    /// Pre-churn accrued award.
    pub earnings: BaseAmount,
    /// Post-churn status.
    pub status: String,
}

/// A row from the `bond_provider` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProviderRecord {
    /// Row ID.
    pub id: Uuid,
    /// Owning node row.
    pub node_id: Uuid,
    /// Churn height.
    pub block_number: u64,
    /// Validator address.
    pub node_address: String,
    /// Bond provider address.
    pub bond_provider_address: String,
    /// Post-churn bonded amount.
    pub bond_amount: BaseAmount,
}

/// A notification job awaiting delivery, from the `pending_notification` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedNotification {
    /// Row ID.
    pub id: Uuid,
    /// Churn height that produced the job.
    pub block_number: u64,
    /// The job to deliver.
    pub job: NotificationJob,
}
