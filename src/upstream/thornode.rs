//! Thornode validator-set state.

use async_trait::async_trait;

use super::{ChainClient, NodeStateFetcher};
use crate::domain::NodeState;
use crate::domain::node_state::NodeStateWire;
use crate::error::IndexerError;

/// [`NodeStateFetcher`] backed by `GET {base}/nodes?height={h}`.
#[derive(Debug, Clone)]
pub struct ThornodeNodeFetcher {
    client: ChainClient,
    base_url: String,
}

impl ThornodeNodeFetcher {
    /// Creates a fetcher for the given Thornode base URL
    /// (e.g. `https://thornode.ninerealms.com/thorchain`).
    #[must_use]
    pub fn new(client: ChainClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn nodes_url(&self, height: u64) -> String {
        format!("{}/nodes?height={height}", self.base_url)
    }
}

#[async_trait]
impl NodeStateFetcher for ThornodeNodeFetcher {
    async fn nodes_at(&self, height: u64) -> Result<Vec<NodeState>, IndexerError> {
        tracing::debug!(height, "fetching nodes");
        let wire: Vec<NodeStateWire> = self.client.get_json(&self.nodes_url(height)).await?;
        let nodes = wire
            .into_iter()
            .map(NodeState::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(height, count = nodes.len(), "nodes fetched");
        Ok(nodes)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::upstream::RetryPolicy;

    #[test]
    fn url_carries_height() {
        let Ok(client) = ChainClient::new(Duration::from_secs(1), RetryPolicy::default()) else {
            panic!("client builds");
        };
        let fetcher = ThornodeNodeFetcher::new(client, "https://thornode.example/thorchain");
        assert_eq!(
            fetcher.nodes_url(17_466_048),
            "https://thornode.example/thorchain/nodes?height=17466048"
        );
    }
}
