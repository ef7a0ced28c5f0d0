//! External identity providers.

pub mod google;

pub use google::{GoogleClient, GoogleProfile, OAuthError};
