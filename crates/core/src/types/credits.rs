//! Credit balance unit.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::RechargeAmount;

/// A whole number of usage credits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(i64);

impl Credits {
    /// Zero credits.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw credit count.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw credit count.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Credits bought by `amount` at `per_brl` credits per real, rounded down.
    ///
    /// Saturates at `i64::MAX` instead of overflowing.
    #[must_use]
    pub fn for_purchase(amount: RechargeAmount, per_brl: u32) -> Self {
        amount
            .value()
            .checked_mul(Decimal::from(per_brl))
            .and_then(|total| total.floor().to_i64())
            .map_or(Self(i64::MAX), Self)
    }

    /// Add two balances, saturating.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
