//! # tenang_core
//!
//! Request admission core for Tenang: signed identity tokens and the
//! adaptive, endpoint-aware admission limiter.

pub mod admission;
pub mod auth;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
