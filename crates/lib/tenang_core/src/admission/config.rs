//! Limiter configuration: per-class quotas and the adaptive policy.

use std::ops::RangeInclusive;

use chrono::Duration;

use super::class::EndpointClass;

/// Base ceiling of `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::minutes(1))
    }
}

/// Base quota for each endpoint class.
///
/// `auth` and `public` are reachable by unverified callers and must stay the
/// smallest ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassQuotas {
    pub crisis: Quota,
    pub chat: Quota,
    pub community: Quota,
    pub auth: Quota,
    pub admin: Quota,
    pub public: Quota,
}

impl ClassQuotas {
    pub fn get(&self, class: EndpointClass) -> Quota {
        match class {
            EndpointClass::Crisis => self.crisis,
            EndpointClass::Chat => self.chat,
            EndpointClass::Community => self.community,
            EndpointClass::Auth => self.auth,
            EndpointClass::Admin => self.admin,
            EndpointClass::Public => self.public,
        }
    }

    pub fn get_mut(&mut self, class: EndpointClass) -> &mut Quota {
        match class {
            EndpointClass::Crisis => &mut self.crisis,
            EndpointClass::Chat => &mut self.chat,
            EndpointClass::Community => &mut self.community,
            EndpointClass::Auth => &mut self.auth,
            EndpointClass::Admin => &mut self.admin,
            EndpointClass::Public => &mut self.public,
        }
    }
}

impl Default for ClassQuotas {
    fn default() -> Self {
        Self {
            crisis: Quota::per_minute(200),
            chat: Quota::per_minute(100),
            community: Quota::per_minute(60),
            auth: Quota::per_minute(10),
            admin: Quota::per_minute(300),
            public: Quota::per_minute(20),
        }
    }
}

/// Multipliers applied on top of a class's base limit.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptivePolicy {
    pub authenticated: f64,
    /// Replaces, never compounds with, the authenticated multiplier.
    pub crisis: f64,
    /// Applied while the client has no denials in the current window.
    pub good_behavior: f64,
    pub peak: f64,
    /// Local hours (inclusive) treated as high demand.
    pub peak_hours: RangeInclusive<u32>,
}

impl AdaptivePolicy {
    /// A policy that leaves every base limit untouched.
    pub fn neutral() -> Self {
        Self {
            authenticated: 1.0,
            crisis: 1.0,
            good_behavior: 1.0,
            peak: 1.0,
            peak_hours: 18..=23,
        }
    }
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            authenticated: 1.5,
            crisis: 3.0,
            good_behavior: 1.2,
            peak: 1.3,
            peak_hours: 18..=23,
        }
    }
}

/// Full limiter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    pub quotas: ClassQuotas,
    pub policy: AdaptivePolicy,
    /// How long after its window closes an idle entry is kept.
    pub stale_grace: Duration,
    pub sweep_interval: std::time::Duration,
    /// Entries seen within this span count as active in usage snapshots.
    pub active_window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            quotas: ClassQuotas::default(),
            policy: AdaptivePolicy::default(),
            stale_grace: Duration::hours(1),
            sweep_interval: std::time::Duration::from_secs(5 * 60),
            active_window: Duration::minutes(5),
        }
    }
}
