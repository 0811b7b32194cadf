//! Route paths.

pub const GET_HEALTH: &str = "/health";
pub const GET_API_FEED: &str = "/api/v1/feed";
pub const POST_AUTH_REFRESH: &str = "/api/v1/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/api/v1/auth/logout";
pub const GET_USERS_USER_ID_SESSION: &str = "/api/v1/users/{userId}/session";
pub const GET_ADMIN_RATE_LIMITS: &str = "/api/v1/admin/rate-limits";
