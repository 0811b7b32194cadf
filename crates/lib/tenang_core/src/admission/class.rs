//! Endpoint classification.

use std::fmt;

use serde::Serialize;

/// Coarse route category sharing one quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Crisis,
    Chat,
    Community,
    Auth,
    Admin,
    Public,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 6] = [
        EndpointClass::Crisis,
        EndpointClass::Chat,
        EndpointClass::Community,
        EndpointClass::Auth,
        EndpointClass::Admin,
        EndpointClass::Public,
    ];

    /// Classify a request path by keyword.
    pub fn classify(path: &str) -> Self {
        let has = |needles: &[&str]| needles.iter().any(|n| path.contains(n));

        if has(&["crisis", "emergency", "support"]) {
            EndpointClass::Crisis
        } else if has(&["/chat", "/vocal", "/checkin"]) {
            EndpointClass::Chat
        } else if has(&["/auth"]) {
            EndpointClass::Auth
        } else if has(&["/admin", "/system"]) {
            EndpointClass::Admin
        } else if has(&["/community", "/social"]) {
            EndpointClass::Community
        } else {
            EndpointClass::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Crisis => "crisis",
            EndpointClass::Chat => "chat",
            EndpointClass::Community => "community",
            EndpointClass::Auth => "auth",
            EndpointClass::Admin => "admin",
            EndpointClass::Public => "public",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        let cases = [
            ("/api/v1/support/crisis-line", EndpointClass::Crisis),
            ("/api/v1/emergency", EndpointClass::Crisis),
            ("/api/v1/chat/abc/sessions", EndpointClass::Chat),
            ("/api/v1/vocal/abc/entries", EndpointClass::Chat),
            ("/api/v1/chat/abc/checkins", EndpointClass::Chat),
            ("/api/v1/auth/login", EndpointClass::Auth),
            ("/api/v1/admin/rate-limits", EndpointClass::Admin),
            ("/api/v1/system/health", EndpointClass::Admin),
            ("/api/v1/community/posts", EndpointClass::Community),
            ("/api/v1/social/abc/accounts", EndpointClass::Community),
            ("/health", EndpointClass::Public),
            ("/api/v1/feed", EndpointClass::Public),
        ];
        for (path, expected) in cases {
            assert_eq!(EndpointClass::classify(path), expected, "{path}");
        }
    }

    #[test]
    fn crisis_keywords_win_over_route_prefix() {
        assert_eq!(
            EndpointClass::classify("/api/v1/chat/support"),
            EndpointClass::Crisis
        );
    }
}
