//! Domain models shared by the token service, the limiter and the HTTP layer.

pub mod auth;
