//! Request admission middleware.

pub mod auth;
pub mod rate_limit;
