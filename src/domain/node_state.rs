//! Validator-set state as of a block height.
//!
//! [`NodeStateWire`] mirrors the Thornode `nodes` response (only the fields
//! the indexer consumes). [`NodeState`] is the parsed form with base-unit
//! amounts. The aggregate helpers operate on the pre-churn set.

use serde::{Deserialize, Serialize};

use super::amount::BaseAmount;
use crate::error::IndexerError;

/// Status of a node taking part in consensus.
pub const STATUS_ACTIVE: &str = "Active";

/// Status of a node queued to become active at the next churn.
pub const STATUS_READY: &str = "Ready";

/// One bond provider entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProviderWire {
    /// Bond provider address.
    pub bond_address: String,
    /// Bonded amount in base units.
    pub bond: String,
}

/// Wrapper object Thornode nests provider entries in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProvidersWire {
    /// Provider entries; absent for nodes without providers.
    #[serde(default)]
    pub providers: Option<Vec<BondProviderWire>>,
}

/// One node entry from `GET {thornode}/nodes?height={h}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateWire {
    /// Validator address.
    pub node_address: String,
    /// Validator status string.
    pub status: String,
    /// Total bond in base units.
    pub total_bond: String,
    /// Accrued reward in base units.
    pub current_award: String,
    /// Bond provider listing.
    #[serde(default)]
    pub bond_providers: Option<BondProvidersWire>,
}

/// A bond provider's stake in one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProviderState {
    /// Bond provider address.
    pub bond_provider_address: String,
    /// Bonded amount.
    pub bond_amount: BaseAmount,
}

/// Parsed state of one validator at a height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Validator address.
    pub node_address: String,
    /// Opaque status string (`Active`, `Ready`, `Standby`, ...).
    pub status: String,
    /// Total bond.
    pub total_bond: BaseAmount,
    /// Accrued reward.
    pub current_award: BaseAmount,
    /// Bond providers delegating to this node.
    pub bond_providers: Vec<BondProviderState>,
}

impl NodeState {
    /// Returns `true` if the node is in the active set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

impl TryFrom<NodeStateWire> for NodeState {
    type Error = IndexerError;

    fn try_from(wire: NodeStateWire) -> Result<Self, Self::Error> {
        let bond_providers = wire
            .bond_providers
            .and_then(|bp| bp.providers)
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                Ok(BondProviderState {
                    bond_amount: p.bond.parse()?,
                    bond_provider_address: p.bond_address,
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;

        Ok(Self {
            total_bond: wire.total_bond.parse()?,
            current_award: wire.current_award.parse()?,
            node_address: wire.node_address,
            status: wire.status,
            bond_providers,
        })
    }
}

/// Sum of `total_bond` over Active nodes.
#[must_use]
pub fn total_active_bond(nodes: &[NodeState]) -> BaseAmount {
    nodes
        .iter()
        .filter(|n| n.is_active())
        .map(|n| n.total_bond)
        .sum()
}

/// Sum of `current_award` over Active nodes.
#[must_use]
pub fn total_active_earnings(nodes: &[NodeState]) -> BaseAmount {
    nodes
        .iter()
        .filter(|n| n.is_active())
        .map(|n| n.current_award)
        .sum()
}

/// Returns `true` for the Active/Ready pair, in either direction.
///
/// Nodes move between these two statuses routinely around churns, so the
/// transition is not worth alerting bond providers about.
#[must_use]
pub fn is_benign_transition(previous: &str, current: &str) -> bool {
    matches!(
        (previous, current),
        (STATUS_ACTIVE, STATUS_READY) | (STATUS_READY, STATUS_ACTIVE)
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn node(status: &str, bond: u128, award: u128) -> NodeState {
        NodeState {
            node_address: format!("thor1{status}{bond}"),
            status: status.to_string(),
            total_bond: BaseAmount::new(bond),
            current_award: BaseAmount::new(award),
            bond_providers: Vec::new(),
        }
    }

    #[test]
    fn total_active_bond_ignores_other_statuses() {
        let nodes = [
            node("Active", 100, 1),
            node("Standby", 50, 2),
            node("Active", 20, 3),
        ];
        assert_eq!(total_active_bond(&nodes), BaseAmount::new(120));
        assert_eq!(total_active_earnings(&nodes), BaseAmount::new(4));
    }

    #[test]
    fn aggregates_of_empty_set_are_zero() {
        assert_eq!(total_active_bond(&[]), BaseAmount::ZERO);
        assert_eq!(total_active_earnings(&[]), BaseAmount::ZERO);
    }

    #[test]
    fn benign_pair_is_symmetric() {
        assert!(is_benign_transition("Active", "Ready"));
        assert!(is_benign_transition("Ready", "Active"));
        assert!(!is_benign_transition("Active", "Standby"));
        assert!(!is_benign_transition("Standby", "Ready"));
    }

    #[test]
    fn converts_thornode_json() {
        let body = r#"[
            {
                "node_address": "thor1abc",
                "status": "Active",
                "total_bond": "150000000000",
                "current_award": "250000000",
                "bond_providers": {
                    "node_operator_fee": "2000",
                    "providers": [
                        {"bond_address": "thor1p1", "bond": "100000000000"},
                        {"bond_address": "thor1p2", "bond": "50000000000"}
                    ]
                },
                "preflight_status": {"status": "Ready"}
            },
            {
                "node_address": "thor1def",
                "status": "Standby",
                "total_bond": "0",
                "current_award": "0"
            }
        ]"#;
        let Ok(wire) = serde_json::from_str::<Vec<NodeStateWire>>(body) else {
            panic!("valid json");
        };
        let Ok(nodes) = wire
            .into_iter()
            .map(NodeState::try_from)
            .collect::<Result<Vec<_>, _>>()
        else {
            panic!("valid nodes");
        };
        let [first, second] = nodes.as_slice() else {
            panic!("expected two nodes");
        };
        assert_eq!(first.bond_providers.len(), 2);
        assert_eq!(first.total_bond, BaseAmount::new(150_000_000_000));
        assert!(second.bond_providers.is_empty());
    }

    #[test]
    fn rejects_malformed_bond() {
        let wire = NodeStateWire {
            node_address: "thor1abc".to_string(),
            status: "Active".to_string(),
            total_bond: "lots".to_string(),
            current_award: "0".to_string(),
            bond_providers: None,
        };
        assert!(NodeState::try_from(wire).is_err());
    }
}
