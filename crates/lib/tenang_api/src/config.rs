//! API server configuration.

use std::str::FromStr;

use chrono::Duration;
use tenang_core::admission::{EndpointClass, LimiterConfig};
use tenang_core::auth::jwt::resolve_secret;
use tenang_core::auth::tokens::{
    ACCESS_TOKEN_EXPIRY_SECS, DEFAULT_ADMIN_DOMAIN, DEFAULT_AUDIENCE, DEFAULT_ISSUER,
    REFRESH_TOKEN_EXPIRY_SECS, TokenConfig,
};
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Key anonymous clients by `X-Forwarded-For` / `X-Real-IP`.
    /// Enable only behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,
    pub tokens: TokenConfig,
    pub limiter: LimiterConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                              | Default                            |
    /// |---------------------------------------|------------------------------------|
    /// | `BIND_ADDR`                           | `127.0.0.1:8080`                   |
    /// | `DATABASE_URL`                        | `postgres://localhost:5432/tenang` |
    /// | `TRUST_PROXY_HEADERS`                 | `false`                            |
    /// | `JWT_ACCESS_SECRET`                   | generated & persisted to file      |
    /// | `JWT_REFRESH_SECRET`                  | generated & persisted to file      |
    /// | `JWT_ACCESS_EXPIRY_SECS`              | `900`                              |
    /// | `JWT_REFRESH_EXPIRY_SECS`             | `604800`                           |
    /// | `JWT_ISSUER` / `JWT_AUDIENCE`         | `tenang.in` / `tenang.in-users`    |
    /// | `ADMIN_EMAIL_DOMAIN`                  | `tenang.in`                        |
    /// | `RATE_LIMIT_<CLASS>_LIMIT`            | per class                          |
    /// | `RATE_LIMIT_<CLASS>_WINDOW_SECS`      | `60`                               |
    /// | `RATE_LIMIT_PEAK_START` / `_END`      | `18` / `23`                        |
    /// | `RATE_LIMIT_STALE_GRACE_SECS`         | `3600`                             |
    /// | `RATE_LIMIT_SWEEP_INTERVAL_SECS`      | `300`                              |
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8080"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/tenang"),
            trust_proxy_headers: env_parse("TRUST_PROXY_HEADERS", false),
            tokens: token_config_from_env(),
            limiter: limiter_config_from_env(),
        }
    }
}

fn token_config_from_env() -> TokenConfig {
    TokenConfig {
        access_secret: resolve_secret("JWT_ACCESS_SECRET", "jwt-access-secret"),
        refresh_secret: resolve_secret("JWT_REFRESH_SECRET", "jwt-refresh-secret"),
        access_ttl: env_secs(
            "JWT_ACCESS_EXPIRY_SECS",
            Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
        ),
        refresh_ttl: env_secs(
            "JWT_REFRESH_EXPIRY_SECS",
            Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS),
        ),
        issuer: env_or("JWT_ISSUER", DEFAULT_ISSUER),
        audience: env_or("JWT_AUDIENCE", DEFAULT_AUDIENCE),
        admin_domain: env_or("ADMIN_EMAIL_DOMAIN", DEFAULT_ADMIN_DOMAIN),
    }
}

fn limiter_config_from_env() -> LimiterConfig {
    let mut config = LimiterConfig::default();
    for class in EndpointClass::ALL {
        let prefix = format!("RATE_LIMIT_{}", class.as_str().to_ascii_uppercase());
        let quota = config.quotas.get_mut(class);
        quota.limit = env_parse(&format!("{prefix}_LIMIT"), quota.limit);
        quota.window = env_secs(&format!("{prefix}_WINDOW_SECS"), quota.window);
    }

    let start = env_parse("RATE_LIMIT_PEAK_START", *config.policy.peak_hours.start());
    let end = env_parse("RATE_LIMIT_PEAK_END", *config.policy.peak_hours.end());
    config.policy.peak_hours = start..=end;

    config.stale_grace = env_secs("RATE_LIMIT_STALE_GRACE_SECS", config.stale_grace);
    let default_sweep =
        Duration::from_std(config.sweep_interval).unwrap_or(Duration::minutes(5));
    config.sweep_interval = env_secs("RATE_LIMIT_SWEEP_INTERVAL_SECS", default_sweep)
        .to_std()
        .unwrap_or(config.sweep_interval);
    config
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Longest duration accepted from the environment: ten years.
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Read a whole number of seconds in `1..=MAX_DURATION_SECS`, falling back to
/// `default` (with a warning) on anything else.
fn env_secs(key: &str, default: Duration) -> Duration {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    let parsed = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| (1..=MAX_DURATION_SECS).contains(secs))
        .and_then(Duration::try_seconds);
    parsed.unwrap_or_else(|| {
        warn!(
            key,
            value = %raw,
            default_secs = default.num_seconds(),
            "ignoring out-of-range duration setting"
        );
        default
    })
}

/// Parse `key` if set, falling back to `default` (with a warning) on bad input.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, %default, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_missing_or_bad_values() {
        assert_eq!(env_parse("TENANG_TEST_UNSET_SETTING", 42u32), 42);
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("TENANG_TEST_BAD_SETTING", "lots") };
        assert_eq!(env_parse("TENANG_TEST_BAD_SETTING", 7i64), 7);
        unsafe { std::env::set_var("TENANG_TEST_BAD_SETTING", " 12 ") };
        assert_eq!(env_parse("TENANG_TEST_BAD_SETTING", 7i64), 12);
    }

    #[test]
    fn env_secs_rejects_out_of_range_values() {
        let default = Duration::seconds(900);
        assert_eq!(env_secs("TENANG_TEST_UNSET_SECS", default), default);

        for bad in ["10000000000000000", "-30", "0", "soon"] {
            // SAFETY: no other test reads or writes this variable.
            unsafe { std::env::set_var("TENANG_TEST_SECS", bad) };
            assert_eq!(env_secs("TENANG_TEST_SECS", default), default, "{bad}");
        }

        unsafe { std::env::set_var("TENANG_TEST_SECS", "120") };
        assert_eq!(env_secs("TENANG_TEST_SECS", default), Duration::seconds(120));
    }

    #[test]
    fn limiter_settings_out_of_range_keep_defaults() {
        // SAFETY: no other test reads or writes these variables.
        unsafe {
            std::env::set_var("RATE_LIMIT_CHAT_WINDOW_SECS", "10000000000000000");
            std::env::set_var("RATE_LIMIT_STALE_GRACE_SECS", "-60");
            std::env::set_var("RATE_LIMIT_SWEEP_INTERVAL_SECS", "0");
        }
        let config = limiter_config_from_env();
        let defaults = LimiterConfig::default();
        assert_eq!(config.quotas.chat.window, defaults.quotas.chat.window);
        assert_eq!(config.stale_grace, defaults.stale_grace);
        assert_eq!(config.sweep_interval, defaults.sweep_interval);
    }
}
