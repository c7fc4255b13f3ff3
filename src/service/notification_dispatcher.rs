//! Notification dispatcher: builds job payloads and hands them to the queue.

use std::sync::Arc;

use crate::domain::NotificationJob;
use crate::domain::notification::{NodeChurnPayload, NodeStatusPayload, NotificationPayload};
use crate::error::IndexerError;
use crate::queue::NotificationQueue;

/// Dispatcher settings, usually taken from [`crate::config::IndexerConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Master switch; when `false` every delivery is a logged no-op.
    pub enabled: bool,
    /// Dashboard base URL used in payload links.
    pub dashboard_url: String,
    /// Token symbol reported in bond-churn payloads.
    pub token_symbol: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dashboard_url: "https://runebond.com".to_string(),
            token_symbol: "RUNE".to_string(),
        }
    }
}

/// Builds notification jobs and enqueues them.
///
/// Constructed once at startup and passed into the indexing engine. Has
/// no retry or delivery logic: queue failures are returned unchanged.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    queue: Arc<dyn NotificationQueue>,
    settings: DispatcherSettings,
}

impl NotificationDispatcher {
    /// Creates a dispatcher on top of `queue`.
    #[must_use]
    pub fn new(queue: Arc<dyn NotificationQueue>, settings: DispatcherSettings) -> Self {
        tracing::info!(enabled = settings.enabled, "notification dispatcher ready");
        Self { queue, settings }
    }

    /// Returns `true` if notifications are enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Enqueues `job`.
    ///
    /// When notifications are disabled this is a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns the queue's error unchanged.
    pub async fn deliver(&self, job: &NotificationJob) -> Result<(), IndexerError> {
        let kind = job.kind;
        let observable_address = job.observable_address.as_str();
        if !self.settings.enabled {
            tracing::debug!(%kind, observable_address, "notifications disabled, skipping");
            return Ok(());
        }

        match self.queue.enqueue(job).await {
            Ok(()) => {
                tracing::info!(%kind, observable_address, "notification job queued");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    %kind,
                    observable_address,
                    error = %e,
                    "failed to queue notification"
                );
                Err(e)
            }
        }
    }

    /// Builds the payload for a node status change.
    #[must_use]
    pub fn node_status_changed(
        &self,
        node_address: &str,
        status: &str,
        details: Option<String>,
    ) -> NotificationPayload {
        NotificationPayload::NodeStatusChanged(NodeStatusPayload {
            node_name: node_address.to_string(),
            node_dashboard_url: format!("{}/nodes/{node_address}", self.base_url()),
            status: status.to_string(),
            details,
        })
    }

    /// Builds the payload for a bond balance change. Balances are
    /// display-unit strings.
    #[must_use]
    pub fn node_churn(
        &self,
        bond_provider_address: &str,
        node_address: &str,
        previous_bond_balance: String,
        new_bond_balance: String,
    ) -> NotificationPayload {
        NotificationPayload::NodeChurn(NodeChurnPayload {
            node_name: node_address.to_string(),
            node_dashboard_url: format!(
                "{}/user-requests?user={bond_provider_address}",
                self.base_url()
            ),
            previous_bond_balance,
            new_bond_balance,
            token_symbol: self.settings.token_symbol.clone(),
            details: None,
        })
    }

    fn base_url(&self) -> &str {
        self.settings.dashboard_url.trim_end_matches('/')
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::NotificationKind;
    use crate::queue::MemoryNotificationQueue;

    fn dispatcher(enabled: bool) -> (NotificationDispatcher, MemoryNotificationQueue) {
        let queue = MemoryNotificationQueue::new();
        let settings = DispatcherSettings {
            enabled,
            dashboard_url: "https://dash.example/".to_string(),
            token_symbol: "RUNE".to_string(),
        };
        (
            NotificationDispatcher::new(Arc::new(queue.clone()), settings),
            queue,
        )
    }

    fn status_job(dispatcher: &NotificationDispatcher) -> NotificationJob {
        NotificationJob::new(
            "thor1p",
            dispatcher.node_status_changed("thor1n", "Standby", Some("details".to_string())),
        )
    }

    #[tokio::test]
    async fn disabled_dispatcher_is_a_no_op() {
        let (dispatcher, queue) = dispatcher(false);
        let result = dispatcher.deliver(&status_job(&dispatcher)).await;
        assert!(result.is_ok());
        assert!(queue.jobs().is_empty());
        assert!(!dispatcher.is_enabled());
    }

    #[tokio::test]
    async fn status_change_job_links_node_page() {
        let (dispatcher, queue) = dispatcher(true);
        let result = dispatcher.deliver(&status_job(&dispatcher)).await;
        assert!(result.is_ok());

        let jobs = queue.jobs();
        let [job] = jobs.as_slice() else {
            panic!("expected one job");
        };
        assert_eq!(job.observable_address, "thor1p");
        assert_eq!(job.kind, NotificationKind::NodeStatusChanged);
        let NotificationPayload::NodeStatusChanged(payload) = &job.payload else {
            panic!("wrong payload");
        };
        assert_eq!(payload.node_dashboard_url, "https://dash.example/nodes/thor1n");
        assert_eq!(payload.status, "Standby");
    }

    #[tokio::test]
    async fn churn_job_links_provider_page() {
        let (dispatcher, queue) = dispatcher(true);
        let payload =
            dispatcher.node_churn("thor1p", "thor1n", "1.000".to_string(), "1.001".to_string());
        let result = dispatcher.deliver(&NotificationJob::new("thor1p", payload)).await;
        assert!(result.is_ok());

        let jobs = queue.jobs();
        let Some(NotificationPayload::NodeChurn(payload)) = jobs.first().map(|j| &j.payload)
        else {
            panic!("expected churn payload");
        };
        assert_eq!(
            payload.node_dashboard_url,
            "https://dash.example/user-requests?user=thor1p"
        );
        assert_eq!(payload.token_symbol, "RUNE");
    }

    #[tokio::test]
    async fn queue_errors_propagate() {
        let (dispatcher, queue) = dispatcher(true);
        queue.set_rejecting(true);
        let Err(err) = dispatcher.deliver(&status_job(&dispatcher)).await else {
            panic!("expected error");
        };
        assert_eq!(err.error_code(), "notification_dispatch");
    }
}
