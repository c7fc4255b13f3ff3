//! Churn events as reported by Midgard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Raw churn entry from `GET {midgard}/churns`.
///
/// Both fields are strings on the wire; `date` is nanoseconds since the
/// Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnWire {
    /// Churn block height.
    pub height: String,
    /// Nanoseconds since epoch.
    pub date: String,
}

/// A validator-set change at a given block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Churn {
    /// Block height of the churn.
    pub height: u64,
    /// Block time, millisecond resolution.
    pub timestamp: DateTime<Utc>,
}

impl Churn {
    /// Creates a churn from already-parsed parts.
    #[must_use]
    pub const fn new(height: u64, timestamp: DateTime<Utc>) -> Self {
        Self { height, timestamp }
    }
}

impl TryFrom<ChurnWire> for Churn {
    type Error = IndexerError;

    fn try_from(wire: ChurnWire) -> Result<Self, Self::Error> {
        let height = wire.height.trim().parse::<u64>().map_err(|e| {
            IndexerError::InvalidUpstreamData(format!("churn height {:?}: {e}", wire.height))
        })?;
        let nanos = wire.date.trim().parse::<i64>().map_err(|e| {
            IndexerError::InvalidUpstreamData(format!("churn date {:?}: {e}", wire.date))
        })?;
        Ok(Self {
            height,
            timestamp: nanos_to_datetime(nanos)?,
        })
    }
}

/// Converts nanoseconds since epoch to a timestamp, truncating to
/// millisecond resolution.
///
/// # Errors
///
/// Returns [`IndexerError::InvalidUpstreamData`] when the value is outside
/// the representable date range.
pub fn nanos_to_datetime(nanos: i64) -> Result<DateTime<Utc>, IndexerError> {
    let millis = nanos.div_euclid(1_000_000);
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        IndexerError::InvalidUpstreamData(format!("timestamp out of range: {nanos}"))
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_churn() {
        let wire = ChurnWire {
            height: "17466148".to_string(),
            date: "1718012345678901234".to_string(),
        };
        let Ok(churn) = Churn::try_from(wire) else {
            panic!("valid churn");
        };
        assert_eq!(churn.height, 17_466_148);
        assert_eq!(churn.timestamp.timestamp_millis(), 1_718_012_345_678);
    }

    #[test]
    fn rejects_non_numeric_height() {
        let wire = ChurnWire {
            height: "abc".to_string(),
            date: "0".to_string(),
        };
        let Err(err) = Churn::try_from(wire) else {
            panic!("expected error");
        };
        assert_eq!(err.error_code(), "invalid_upstream_data");
    }

    #[test]
    fn truncates_sub_millisecond_precision() {
        let Ok(ts) = nanos_to_datetime(1_999_999) else {
            panic!("valid timestamp");
        };
        assert_eq!(ts.timestamp_millis(), 1);
    }

    #[test]
    fn deserializes_midgard_json() {
        let body = r#"[{"height":"100","date":"1000000000"},{"height":"50","date":"500000000"}]"#;
        let Ok(wire) = serde_json::from_str::<Vec<ChurnWire>>(body) else {
            panic!("valid json");
        };
        assert_eq!(wire.len(), 2);
        assert_eq!(wire.first().map(|c| c.height.as_str()), Some("100"));
    }
}
