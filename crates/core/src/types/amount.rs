//! Recharge amount in Brazilian reais.
//!
//! Amounts are decimal with at most two places, between R$ 9,99 and
//! R$ 100.000,00. Bounds are compared exactly, so `9.99` passes and `9.989`
//! does not, which a float comparison would not guarantee.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors produced when validating a [`RechargeAmount`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The value is missing or is not a number.
    #[error("amount is not a number")]
    NotANumber,
    /// The value is below [`RechargeAmount::MINIMUM`].
    #[error("amount must be at least {min}")]
    BelowMinimum {
        /// The minimum accepted value.
        min: Decimal,
    },
    /// The value is above [`RechargeAmount::MAXIMUM`].
    #[error("amount must be at most {max}")]
    AboveMaximum {
        /// The maximum accepted value.
        max: Decimal,
    },
    /// The value has fractions of a centavo.
    #[error("amount must have at most 2 decimal places")]
    TooPrecise,
}

/// A validated recharge amount (BRL): R$ 9,99 to R$ 100.000,00, whole
/// centavos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct RechargeAmount(Decimal);

impl RechargeAmount {
    /// Smallest amount a user may recharge: R$ 9,99.
    pub const MINIMUM: Decimal = Decimal::from_parts(999, 0, 0, false, 2);

    /// Largest amount accepted in one recharge: R$ 100.000,00.
    pub const MAXIMUM: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

    /// Validate a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::BelowMinimum`] for anything under R$ 9,99
    /// (including zero and negative values), [`AmountError::AboveMaximum`]
    /// over R$ 100.000,00 and [`AmountError::TooPrecise`] for more than two
    /// decimal places.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Self::MINIMUM {
            return Err(AmountError::BelowMinimum { min: Self::MINIMUM });
        }
        if value > Self::MAXIMUM {
            return Err(AmountError::AboveMaximum { max: Self::MAXIMUM });
        }
        let value = value.normalize();
        if value.scale() > 2 {
            return Err(AmountError::TooPrecise);
        }
        Ok(Self(value))
    }

    /// Validate an amount received as loosely typed JSON.
    ///
    /// Accepts numbers and numeric strings (`50`, `9.99`, `"50,00"` is
    /// rejected). Missing values, `null`, booleans and anything that does
    /// not parse are [`AmountError::NotANumber`].
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] when the value is not a number or is below
    /// the minimum.
    pub fn from_json(value: Option<&serde_json::Value>) -> Result<Self, AmountError> {
        let decimal = match value {
            Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
            Some(serde_json::Value::String(s)) => parse_decimal(s.trim()),
            _ => None,
        }
        .ok_or(AmountError::NotANumber)?;

        Self::new(decimal)
    }

    /// The amount as a decimal.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

/// Parse plain or scientific notation (`serde_json` prints large floats as `1e3`).
fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

impl TryFrom<Decimal> for RechargeAmount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RechargeAmount> for Decimal {
    fn from(amount: RechargeAmount) -> Self {
        amount.0
    }
}

impl fmt::Display for RechargeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R$ {:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_minimum_is_nine_ninety_nine() {
        assert_eq!(RechargeAmount::MINIMUM, dec("9.99"));
    }

    #[test]
    fn test_accepts_minimum_and_above() {
        assert!(RechargeAmount::new(dec("9.99")).is_ok());
        assert!(RechargeAmount::new(dec("50")).is_ok());
        assert!(RechargeAmount::new(dec("250.00")).is_ok());
    }

    #[test]
    fn test_rejects_below_minimum() {
        for raw in ["9.98", "9.989", "5", "0", "-10"] {
            assert!(
                matches!(
                    RechargeAmount::new(dec(raw)),
                    Err(AmountError::BelowMinimum { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_above_maximum() {
        assert!(RechargeAmount::new(dec("100000.00")).is_ok());
        assert_eq!(
            RechargeAmount::new(dec("100000.01")),
            Err(AmountError::AboveMaximum {
                max: RechargeAmount::MAXIMUM
            })
        );
        assert!(matches!(
            RechargeAmount::from_json(Some(&json!(1e10))),
            Err(AmountError::AboveMaximum { .. })
        ));
        assert!(matches!(
            RechargeAmount::from_json(Some(&json!("79228162514264337593543950335"))),
            Err(AmountError::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_rejects_fractions_of_centavo() {
        assert_eq!(
            RechargeAmount::new(dec("10.001")),
            Err(AmountError::TooPrecise)
        );
        assert_eq!(
            RechargeAmount::from_json(Some(&json!("25.999"))),
            Err(AmountError::TooPrecise)
        );
        // Trailing zeros are not precision.
        let amount = RechargeAmount::new(dec("10.500")).unwrap();
        assert_eq!(amount.value(), dec("10.5"));
    }

    #[test]
    fn test_from_json_numbers_and_strings() {
        let amount = RechargeAmount::from_json(Some(&json!(50))).unwrap();
        assert_eq!(amount.value(), dec("50"));

        let amount = RechargeAmount::from_json(Some(&json!(9.99))).unwrap();
        assert_eq!(amount.value(), dec("9.99"));

        let amount = RechargeAmount::from_json(Some(&json!(" 100.5 "))).unwrap();
        assert_eq!(amount.value(), dec("100.5"));
    }

    #[test]
    fn test_from_json_non_numbers() {
        for value in [json!(null), json!(true), json!("abc"), json!(""), json!([50])] {
            assert_eq!(
                RechargeAmount::from_json(Some(&value)),
                Err(AmountError::NotANumber),
                "{value} should not parse"
            );
        }
        assert_eq!(RechargeAmount::from_json(None), Err(AmountError::NotANumber));
    }

    #[test]
    fn test_from_json_below_minimum() {
        assert!(matches!(
            RechargeAmount::from_json(Some(&json!(5))),
            Err(AmountError::BelowMinimum { .. })
        ));
    }

    #[test]
    fn test_display_uses_two_decimals() {
        let amount = RechargeAmount::new(dec("50")).unwrap();
        assert_eq!(amount.to_string(), "R$ 50.00");
    }
}
