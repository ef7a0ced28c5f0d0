//! Domain models for the credits portal.
//!
//! These are validated domain types, separate from the database row types in
//! [`crate::db`].

pub mod credits;
pub mod intent;
pub mod session;
pub mod user;

pub use credits::{LedgerEntry, LedgerKind, Settlement};
pub use intent::{GatewayRefs, NewIntent, PaymentIntent};
pub use session::CurrentUser;
pub use session::keys as session_keys;
pub use user::{NewUser, OAuthAccount, User};
