//! Credits Core - Shared domain types.
//!
//! This crate provides the types used across the credits portal components:
//! - `portal` - HTTP service (checkout, auth, credits)
//! - `cli` - Command-line tools for migrations and payment inspection
//!
//! # Architecture
//!
//! The core crate contains only types and validation rules - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, recharge amounts, credits
//!   and payment methods/statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
