//! Per-provider notification rules evaluated against the previous churn.

use crate::domain::BaseAmount;
use crate::domain::node_state::{STATUS_ACTIVE, is_benign_transition};

/// Fractional digits used when comparing and reporting bond balances.
pub const DISPLAY_PLACES: u32 = 3;

/// Decides whether a status-change notification fires for one provider.
///
/// Requires a known previous status that differs from `current`, outside
/// the Active/Ready pair, and a provider that still has bond in the node.
#[must_use]
pub fn status_change_due(previous: Option<&str>, current: &str, bond: BaseAmount) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    previous != current && !is_benign_transition(previous, current) && bond.is_positive()
}

/// Decides whether a bond-churn notification fires for one provider.
///
/// Returns the `(previous, new)` display balances when the node is Active
/// after the churn, a previous balance is known, and the two balances
/// differ at [`DISPLAY_PLACES`] precision.
#[must_use]
pub fn bond_change_due(
    current_status: &str,
    previous: Option<BaseAmount>,
    new: BaseAmount,
) -> Option<(String, String)> {
    if current_status != STATUS_ACTIVE {
        return None;
    }
    let previous = previous?.to_display(DISPLAY_PLACES);
    let new = new.to_display(DISPLAY_PLACES);
    (previous != new).then_some((previous, new))
}

/// Detail line attached to status-change notifications.
#[must_use]
pub fn status_change_details(previous: &str, current: &str, block_number: u64) -> String {
    format!(
        "Status changed from {previous} to {current} at block {block_number}. \
         Remember that nodes in standby mode do not generate rewards, \
         but this is when UNBOND becomes possible."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOND: BaseAmount = BaseAmount::new(1_00000000);

    #[test]
    fn active_to_ready_never_notifies() {
        assert!(!status_change_due(Some("Active"), "Ready", BOND));
        assert!(!status_change_due(Some("Ready"), "Active", BaseAmount::new(u128::MAX)));
    }

    #[test]
    fn active_to_standby_with_bond_notifies() {
        assert!(status_change_due(Some("Active"), "Standby", BOND));
        assert!(status_change_due(Some("Standby"), "Disabled", BOND));
    }

    #[test]
    fn status_change_needs_history_change_and_bond() {
        assert!(!status_change_due(None, "Standby", BOND));
        assert!(!status_change_due(Some("Standby"), "Standby", BOND));
        assert!(!status_change_due(Some("Active"), "Standby", BaseAmount::ZERO));
    }

    #[test]
    fn sub_display_bond_changes_are_ignored() {
        let due = bond_change_due("Active", Some(BOND), BaseAmount::new(1_00000001));
        assert_eq!(due, None);
    }

    #[test]
    fn visible_bond_change_is_reported() {
        let due = bond_change_due("Active", Some(BOND), BaseAmount::new(1_00100000));
        assert_eq!(due, Some(("1.000".to_string(), "1.001".to_string())));
    }

    #[test]
    fn bond_change_requires_active_and_history() {
        assert_eq!(
            bond_change_due("Standby", Some(BaseAmount::new(1)), BaseAmount::new(9_00000000)),
            None
        );
        assert_eq!(bond_change_due("Active", None, BaseAmount::new(9_00000000)), None);
    }

    #[test]
    fn details_name_both_statuses_and_block() {
        let details = status_change_details("Active", "Standby", 42);
        assert!(details.starts_with("Status changed from Active to Standby at block 42."));
    }
}
