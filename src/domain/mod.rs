//! Domain layer: churns, validator state, amounts and notification jobs.
//!
//! These are plain data types with parsing from the upstream wire shapes.
//! Nothing here performs I/O.

pub mod amount;
pub mod churn;
pub mod node_state;
pub mod notification;

pub use amount::BaseAmount;
pub use churn::Churn;
pub use node_state::{BondProviderState, NodeState};
pub use notification::{NotificationJob, NotificationKind, NotificationPayload};
