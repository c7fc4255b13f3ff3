//! # churn-indexer
//!
//! THORChain churn indexer: records validator-set snapshots around each
//! churn and notifies bond providers of status and bond changes.
//!
//! For every churn height `H` the indexer reads the validator set at
//! `H - pre_offset` (earnings and aggregates) and `H + post_offset`
//! (status, bond and providers), writes one snapshot with its node and
//! bond provider rows in a single transaction, then queues notifications
//! derived from the difference with the previous churn.
//!
//! ## Architecture
//!
//! ```text
//! Midgard (churn list)      Thornode (nodes at height)
//!     │                         │
//!     ├── ChurnDiscovery        ├── NodeStateFetcher
//!     └──────────┬──────────────┘   (upstream/, ChainClient retries)
//!                │
//!          IndexingEngine (service/)
//!                │
//!     ├── SnapshotStore (persistence/, PostgreSQL)
//!     └── NotificationDispatcher → NotificationQueue (queue/)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod service;
pub mod upstream;
