//! Indexer error types.
//!
//! [`IndexerError`] is the central error type for the crate. Every variant
//! carries a stable [`IndexerError::error_code`] that is attached to log
//! events so failures can be grouped without parsing messages.
//!
//! An already-indexed churn is not an error: it is reported as
//! [`crate::service::ChurnOutcome::AlreadyIndexed`].

/// Failure raised anywhere in the indexing pipeline.
///
/// # Error Codes
///
/// | Code                      | Raised by                      | Effect on the churn          |
/// |---------------------------|--------------------------------|------------------------------|
/// | `upstream_unavailable`    | `ChainClient` retry exhaustion | nothing written              |
/// | `invalid_upstream_data`   | wire conversion                | nothing written              |
/// | `no_churns`               | latest-churn mode              | nothing written              |
/// | `persistence_failure`     | `SnapshotStore` / transaction  | transaction rolled back      |
/// | `notification_dispatch`   | `NotificationQueue`            | rows stay committed          |
/// | `config`                  | `IndexerConfig`                | process refuses to start     |
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// An upstream fetch exhausted its retry budget.
    #[error("upstream unavailable after {attempts} attempts ({url}): {reason}")]
    UpstreamUnavailable {
        /// Requested URL.
        url: String,
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Last transport or status error observed.
        reason: String,
    },

    /// Upstream answered, but with a body that cannot be interpreted.
    #[error("invalid upstream data: {0}")]
    InvalidUpstreamData(String),

    /// The churn list was empty in latest-churn mode.
    #[error("no churns reported by upstream")]
    NoChurns,

    /// Any failure while reading from or writing to the snapshot store.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The notification queue rejected one or more jobs.
    #[error("notification dispatch failed: {0}")]
    NotificationDispatch(String),

    /// Invalid process configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexerError {
    /// Returns the stable code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::InvalidUpstreamData(_) => "invalid_upstream_data",
            Self::NoChurns => "no_churns",
            Self::Persistence(_) => "persistence_failure",
            Self::NotificationDispatch(_) => "notification_dispatch",
            Self::Config(_) => "config",
        }
    }

    /// Returns `true` when the churn's rows were committed even though an
    /// error was reported.
    #[must_use]
    pub const fn rows_committed(&self) -> bool {
        matches!(self, Self::NotificationDispatch(_))
    }
}

impl From<sqlx::Error> for IndexerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for IndexerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(format!("migration failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(IndexerError::NoChurns.error_code(), "no_churns");
        assert_eq!(
            IndexerError::Persistence("x".to_string()).error_code(),
            "persistence_failure"
        );
        let err = IndexerError::UpstreamUnavailable {
            url: "http://localhost/churns".to_string(),
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.error_code(), "upstream_unavailable");
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn only_dispatch_failures_keep_rows() {
        assert!(IndexerError::NotificationDispatch("queue down".to_string()).rows_committed());
        assert!(!IndexerError::Persistence("boom".to_string()).rows_committed());
    }
}
