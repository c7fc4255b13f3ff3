//! Notification job records handed to the delivery queue.
//!
//! The serialized shape is consumed by the external notification worker:
//!
//! ```json
//! {
//!   "observableAddress": "thor1provider...",
//!   "type": "node_status_changed",
//!   "payload": { "nodeName": "thor1node...", "nodeDashboardUrl": "...", "status": "Standby" }
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminator of a notification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A node a provider bonds to changed status.
    NodeStatusChanged,
    /// A provider's bond balance changed across a churn.
    NodeChurn,
}

impl NotificationKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NodeStatusChanged => "node_status_changed",
            Self::NodeChurn => "node_churn",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`NotificationKind::NodeStatusChanged`] job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusPayload {
    /// Node address.
    pub node_name: String,
    /// Dashboard page for the node.
    pub node_dashboard_url: String,
    /// New status.
    pub status: String,
    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Payload of a [`NotificationKind::NodeChurn`] job.
///
/// Balances are display-unit strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeChurnPayload {
    /// Node address.
    pub node_name: String,
    /// Dashboard page for the bond provider.
    pub node_dashboard_url: String,
    /// Balance before the churn.
    pub previous_bond_balance: String,
    /// Balance after the churn.
    pub new_bond_balance: String,
    /// Token symbol, e.g. `RUNE`.
    pub token_symbol: String,
    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Payload of any notification job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    /// Status-change payload.
    NodeStatusChanged(NodeStatusPayload),
    /// Bond-churn payload.
    NodeChurn(NodeChurnPayload),
}

impl NotificationPayload {
    /// Kind matching this payload.
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::NodeStatusChanged(_) => NotificationKind::NodeStatusChanged,
            Self::NodeChurn(_) => NotificationKind::NodeChurn,
        }
    }
}

/// A job record as enqueued for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    /// Address whose subscribers receive the notification.
    pub observable_address: String,
    /// Job discriminator.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Kind-specific payload.
    pub payload: NotificationPayload,
}

impl NotificationJob {
    /// Builds a job, deriving the kind from the payload.
    #[must_use]
    pub fn new(observable_address: impl Into<String>, payload: NotificationPayload) -> Self {
        Self {
            observable_address: observable_address.into(),
            kind: payload.kind(),
            payload,
        }
    }
}
