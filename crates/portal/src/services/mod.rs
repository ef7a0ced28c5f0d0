//! Business logic services for the credits portal.
//!
//! # Services
//!
//! - `auth` - Registration, credential login, Google sign-in, session tokens
//! - `checkout` - PIX charges, hosted card checkouts, status reads
//! - `settlement` - Applying observed statuses and crediting approved payments
//! - `poller` - Bounded, cancellable background status polling

pub mod auth;
pub mod checkout;
pub mod poller;
pub mod settlement;

pub use checkout::{CheckoutCommand, CheckoutError, CheckoutResponse, CheckoutService};
pub use poller::{PollHandle, PollOutcome, PollerConfig, PollerRegistry, StatusPoller};
pub use settlement::{Observation, SettlementError, SettlementService};
