//! Midgard churn list.

use async_trait::async_trait;

use super::{ChainClient, ChurnDiscovery};
use crate::domain::Churn;
use crate::domain::churn::ChurnWire;
use crate::error::IndexerError;

/// [`ChurnDiscovery`] backed by `GET {base}/churns`.
#[derive(Debug, Clone)]
pub struct MidgardChurnDiscovery {
    client: ChainClient,
    base_url: String,
}

impl MidgardChurnDiscovery {
    /// Creates a discovery client for the given Midgard base URL
    /// (e.g. `https://midgard.ninerealms.com/v2`).
    #[must_use]
    pub fn new(client: ChainClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn churns_url(&self) -> String {
        format!("{}/churns", self.base_url)
    }
}

#[async_trait]
impl ChurnDiscovery for MidgardChurnDiscovery {
    async fn list_churns(&self) -> Result<Vec<Churn>, IndexerError> {
        tracing::debug!("fetching churns from midgard");
        let wire: Vec<ChurnWire> = self.client.get_json(&self.churns_url()).await?;
        let churns = wire
            .into_iter()
            .map(Churn::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = churns.len(), "churns fetched");
        Ok(churns)
    }
}
