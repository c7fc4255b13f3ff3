//! Upstream chain APIs.
//!
//! The indexing engine sees the chain through two narrow traits:
//! [`ChurnDiscovery`] (Midgard's churn list) and [`NodeStateFetcher`]
//! (Thornode's validator set as of a height). Both HTTP implementations
//! sit on top of [`ChainClient`], which owns the retry budget; neither
//! trait retries on its own.

pub mod client;
pub mod midgard;
pub mod thornode;

use async_trait::async_trait;

use crate::domain::{Churn, NodeState};
use crate::error::IndexerError;

pub use client::{ChainClient, RetryPolicy};
pub use midgard::MidgardChurnDiscovery;
pub use thornode::ThornodeNodeFetcher;

/// Source of churn events.
#[async_trait]
pub trait ChurnDiscovery: Send + Sync + std::fmt::Debug {
    /// Lists every known churn in upstream order (newest first for Midgard).
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::UpstreamUnavailable`] when the fetch
    /// exhausts its retries.
    async fn list_churns(&self) -> Result<Vec<Churn>, IndexerError>;

    /// Returns the first churn of [`ChurnDiscovery::list_churns`], if any.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ChurnDiscovery::list_churns`].
    async fn latest_churn(&self) -> Result<Option<Churn>, IndexerError> {
        let churns = self.list_churns().await?;
        let latest = churns.into_iter().next();
        match &latest {
            Some(churn) => tracing::debug!(block_number = churn.height, "latest churn found"),
            None => tracing::debug!("no churns found"),
        }
        Ok(latest)
    }
}

/// Source of validator-set state at a given height.
#[async_trait]
pub trait NodeStateFetcher: Send + Sync + std::fmt::Debug {
    /// Returns the full validator set as of `height`.
    ///
    /// Every call is a fresh read; results are never cached.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::UpstreamUnavailable`] when the fetch
    /// exhausts its retries, or [`IndexerError::InvalidUpstreamData`] for
    /// malformed amounts.
    async fn nodes_at(&self, height: u64) -> Result<Vec<NodeState>, IndexerError>;
}
