//! Credit ledger types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use credits_core::{Credits, IntentId, LedgerEntryId, UserId};

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Credits bought through an approved recharge.
    Purchase,
}

impl LedgerKind {
    /// Database name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
        }
    }

    /// Parse the database name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

/// One append-only movement of a user's balance.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    #[serde(skip)]
    pub user_id: UserId,
    pub kind: LedgerKind,
    pub credits: Credits,
    /// Intent that produced the entry.
    pub intent_id: Option<IntentId>,
    pub created_at: DateTime<Utc>,
}

/// Result of crediting an approved intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Credits were added to the owner's balance.
    Credited {
        user_id: UserId,
        credits: Credits,
        balance: Credits,
    },
    /// The intent had no owner; marked settled without crediting anyone.
    Anonymous,
    /// Settlement already ran (or the intent is not approved).
    AlreadySettled,
}
