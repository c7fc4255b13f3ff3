//! Base-unit token amounts.
//!
//! Thornode reports bonds and awards as decimal integer strings in base
//! units (1 RUNE = 10^8 base units). [`BaseAmount`] keeps them as `u128`
//! so sums across the whole validator set never lose precision, and
//! converts to display units only when a human-readable string is needed.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Number of implied decimals in a base-unit amount.
pub const BASE_DECIMALS: u32 = 8;

/// Non-negative amount expressed in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseAmount(u128);

impl BaseAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw base-unit value.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the raw base-unit value.
    #[must_use]
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Returns `true` if the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Converts to display units with `places` fractional digits,
    /// rounding half away from zero.
    ///
    /// `places` larger than [`BASE_DECIMALS`] pads with zeros.
    #[must_use]
    pub fn to_display(self, places: u32) -> String {
        if places == 0 {
            let scale = 10u128.pow(BASE_DECIMALS);
            return (self.0.saturating_add(scale / 2) / scale).to_string();
        }
        let kept = places.min(BASE_DECIMALS);
        let drop = 10u128.pow(BASE_DECIMALS - kept);
        let rounded = if drop == 1 {
            self.0
        } else {
            self.0.saturating_add(drop / 2) / drop
        };
        let frac_scale = 10u128.pow(kept);
        let whole = rounded / frac_scale;
        let frac = rounded % frac_scale;
        let pad = (places - kept) as usize;
        format!(
            "{whole}.{frac:0width$}{zeros}",
            width = kept as usize,
            zeros = "0".repeat(pad)
        )
    }
}

impl fmt::Display for BaseAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BaseAmount {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|e| IndexerError::InvalidUpstreamData(format!("invalid amount {s:?}: {e}")))
    }
}

impl From<u128> for BaseAmount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

impl Sum for BaseAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_rounds_to_three_places() {
        assert_eq!(BaseAmount::new(1_00000000).to_display(3), "1.000");
        assert_eq!(BaseAmount::new(1_00000001).to_display(3), "1.000");
        assert_eq!(BaseAmount::new(1_00100000).to_display(3), "1.001");
        assert_eq!(BaseAmount::new(1_00050000).to_display(3), "1.001");
        assert_eq!(BaseAmount::new(1_00049999).to_display(3), "1.000");
        assert_eq!(BaseAmount::new(99_99950000).to_display(3), "100.000");
    }

    #[test]
    fn display_small_and_zero_amounts() {
        assert_eq!(BaseAmount::ZERO.to_display(3), "0.000");
        assert_eq!(BaseAmount::new(12_345).to_display(3), "0.000");
        assert_eq!(BaseAmount::new(123_456).to_display(3), "0.001");
    }

    #[test]
    fn display_other_precisions() {
        assert_eq!(BaseAmount::new(1_50000000).to_display(0), "2");
        assert_eq!(BaseAmount::new(1_23456789).to_display(8), "1.23456789");
        assert_eq!(BaseAmount::new(1_23456789).to_display(10), "1.2345678900");
    }

    #[test]
    fn parses_decimal_strings() {
        let Ok(amount) = "150000000000".parse::<BaseAmount>() else {
            panic!("valid amount");
        };
        assert_eq!(amount.units(), 150_000_000_000);
        assert!("-5".parse::<BaseAmount>().is_err());
        assert!("1.5".parse::<BaseAmount>().is_err());
        assert!("".parse::<BaseAmount>().is_err());
    }

    #[test]
    fn sum_saturates() {
        let total: BaseAmount = [BaseAmount::new(u128::MAX), BaseAmount::new(1)]
            .into_iter()
            .sum();
        assert_eq!(total.units(), u128::MAX);
    }
}
