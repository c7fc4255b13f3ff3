//! Service layer: churn indexing and notification dispatch.
//!
//! [`IndexingEngine`] drives one churn (or a backfill sweep) through
//! fetch, diff, persist and notify. [`NotificationDispatcher`] turns the
//! decisions from [`churn_diff`] into queued jobs.

pub mod churn_diff;
pub mod indexing_engine;
pub mod notification_dispatcher;

pub use indexing_engine::{
    BackfillSummary, ChurnOutcome, EngineSettings, IndexReport, IndexingEngine,
};
pub use notification_dispatcher::{DispatcherSettings, NotificationDispatcher};
