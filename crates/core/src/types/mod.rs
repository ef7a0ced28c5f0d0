//! Core types for the credits portal.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod amount;
pub mod credits;
pub mod email;
pub mod id;
pub mod payment;

pub use amount::{AmountError, RechargeAmount};
pub use credits::Credits;
pub use email::{Email, EmailError};
pub use id::*;
pub use payment::{PaymentMethod, PaymentMethodError, PaymentStatus};
