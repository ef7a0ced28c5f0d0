//! Payment method and payment status enums.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a payment method string is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported payment method: {0:?}")]
pub struct PaymentMethodError(pub String);

/// How a recharge is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// PIX instant payment, settled by scanning a QR code.
    Pix,
    /// Card payment through the gateway's hosted checkout.
    Card,
}

impl PaymentMethod {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentMethodError;

    /// Exact, case-sensitive match on `pix` or `card`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pix" => Ok(Self::Pix),
            "card" => Ok(Self::Card),
            other => Err(PaymentMethodError(other.to_owned())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a payment as reported by the gateway.
///
/// Mirrors the gateway's vocabulary. `Pending`, `InProcess`, `Authorized`
/// and `InMediation` are in-flight; everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Authorized,
    InMediation,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
}

impl PaymentStatus {
    /// Parse the gateway's status string. Unknown values yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "in_process" => Self::InProcess,
            "authorized" => Self::Authorized,
            "in_mediation" => Self::InMediation,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            _ => return None,
        })
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProcess => "in_process",
            Self::Authorized => "authorized",
            Self::InMediation => "in_mediation",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::ChargedBack => "charged_back",
        }
    }

    /// Whether the payment can no longer change on its own.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Pending | Self::InProcess | Self::Authorized | Self::InMediation
        )
    }

    /// Whether a locally recorded status may be replaced by `next`.
    ///
    /// In-flight statuses may move anywhere. Terminal statuses only move
    /// along the gateway's post-settlement edges (an approved payment can
    /// later be refunded or charged back); they never return to in-flight.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        if !self.is_terminal() {
            return true;
        }
        matches!(
            (self, next),
            (Self::Approved, Self::Refunded | Self::ChargedBack)
        )
    }

    /// Whether a different payment on the same checkout may replace this
    /// status. A declined or cancelled card payment can be retried on the
    /// same hosted checkout; the retry is a new payment with the same
    /// external reference.
    #[must_use]
    pub const fn allows_new_attempt(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL: [PaymentStatus; 9] = [
        PaymentStatus::Pending,
        PaymentStatus::InProcess,
        PaymentStatus::Authorized,
        PaymentStatus::InMediation,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
        PaymentStatus::ChargedBack,
    ];

    #[test]
    fn test_method_parse_is_exact() {
        assert_eq!("pix".parse::<PaymentMethod>(), Ok(PaymentMethod::Pix));
        assert_eq!("card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert!("PIX".parse::<PaymentMethod>().is_err());
        assert!("boleto".parse::<PaymentMethod>().is_err());
        assert!("".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in ALL {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("weird"), None);
    }

    #[test]
    fn test_status_serde_uses_gateway_names() {
        let json = serde_json::to_string(&PaymentStatus::InProcess).unwrap();
        assert_eq!(json, "\"in_process\"");
    }

    #[test]
    fn test_pending_moves_anywhere() {
        for next in ALL {
            assert!(PaymentStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn test_terminal_never_returns_to_in_flight() {
        for from in ALL.into_iter().filter(PaymentStatus::is_terminal) {
            for to in ALL.into_iter().filter(|s| !s.is_terminal()) {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_rejected_is_final() {
        for next in ALL {
            assert!(!PaymentStatus::Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn test_approved_can_be_reversed_by_gateway() {
        assert!(PaymentStatus::Approved.can_transition_to(PaymentStatus::Refunded));
        assert!(PaymentStatus::Approved.can_transition_to(PaymentStatus::ChargedBack));
        assert!(!PaymentStatus::Approved.can_transition_to(PaymentStatus::Rejected));
    }

    #[test]
    fn test_only_failed_attempts_can_be_retried() {
        let retryable: Vec<_> = ALL
            .into_iter()
            .filter(PaymentStatus::allows_new_attempt)
            .collect();
        assert_eq!(
            retryable,
            vec![PaymentStatus::Rejected, PaymentStatus::Cancelled]
        );
    }
}
