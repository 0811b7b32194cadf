//! Adaptive, endpoint-aware admission limiter.
//!
//! Fixed-window counters keyed by `(client identity, endpoint class)`. The map
//! is a `DashMap` for concurrent insert/lookup, and every entry carries its own
//! mutex so only requests from the same client serialize, and then only for
//! the read-modify-write of the counter.

pub mod class;
pub mod config;
pub mod sweep;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Local, Timelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

pub use class::EndpointClass;
pub use config::{AdaptivePolicy, ClassQuotas, LimiterConfig, Quota};
pub use sweep::SweepHandle;

/// Anonymous user agents are truncated to this many characters.
pub const USER_AGENT_MAX_CHARS: usize = 50;

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(Uuid),
    Anonymous { ip: String, user_agent: String },
}

impl ClientKey {
    pub fn anonymous(ip: impl Into<String>, user_agent: &str) -> Self {
        ClientKey::Anonymous {
            ip: ip.into(),
            user_agent: user_agent.chars().take(USER_AGENT_MAX_CHARS).collect(),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            ClientKey::User(id) => Some(*id),
            ClientKey::Anonymous { .. } => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::User(id) => write!(f, "user:{id}"),
            ClientKey::Anonymous { ip, user_agent } => write!(f, "ip:{ip}:ua:{user_agent}"),
        }
    }
}

#[derive(Debug)]
struct ClientQuotaState {
    requests_in_window: u32,
    window_reset_at: DateTime<Utc>,
    /// Denials since the window last rolled over.
    consecutive_denials: u32,
    last_request_at: DateTime<Utc>,
    associated_user_id: Option<Uuid>,
}

type QuotaKey = (String, EndpointClass);
type QuotaEntry = Arc<Mutex<ClientQuotaState>>;

/// Request let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub class: EndpointClass,
    /// Effective ceiling after adaptive adjustments.
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub window: Duration,
}

/// Request refused for quota exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied {
    pub class: EndpointClass,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
    pub window: Duration,
}

impl Denied {
    /// Whole seconds until the window resets, rounded up and capped at the window.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        ((millis + 999) / 1000).min(self.window.num_seconds())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(Admitted),
    Denied(Denied),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

/// Snapshot of tracked clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimiterUsage {
    pub total_clients: usize,
    /// Clients with a request inside the active window.
    pub active_clients: usize,
    pub authenticated: usize,
    pub anonymous: usize,
    /// Quota entries, one per client and endpoint class.
    pub tracked_entries: usize,
}

/// Apply the adaptive multipliers to `base`, in order:
/// authenticated, crisis (overwrites), good behaviour, peak hours.
pub fn adjusted_limit(
    policy: &AdaptivePolicy,
    base: u32,
    class: EndpointClass,
    authenticated: bool,
    consecutive_denials: u32,
    local_hour: u32,
) -> u32 {
    // Truncates like integer math; the epsilon absorbs float error (15 * 1.2).
    let scale = |v: u32, m: f64| (f64::from(v) * m + 1e-9).floor() as u32;

    let mut limit = base;
    if authenticated {
        limit = scale(base, policy.authenticated);
    }
    if class == EndpointClass::Crisis {
        limit = scale(base, policy.crisis);
    }
    if consecutive_denials == 0 {
        limit = scale(limit, policy.good_behavior);
    }
    if policy.peak_hours.contains(&local_hour) {
        limit = scale(limit, policy.peak);
    }
    limit
}

/// Per-client, per-class quota tracker.
#[derive(Debug)]
pub struct AdmissionLimiter {
    config: LimiterConfig,
    clients: DashMap<QuotaKey, QuotaEntry>,
}

impl AdmissionLimiter {
    /// A limiter with no background sweep. See [`AdmissionLimiter::start`].
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Number of tracked `(client, class)` entries.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Classify `path` and check `client` against the current wall clock.
    pub fn check(&self, path: &str, client: &ClientKey) -> Decision {
        self.check_at(
            EndpointClass::classify(path),
            client,
            Utc::now(),
            Local::now().hour(),
        )
    }

    /// Check one request from `client` against `class` as of `now`.
    pub fn check_at(
        &self,
        class: EndpointClass,
        client: &ClientKey,
        now: DateTime<Utc>,
        local_hour: u32,
    ) -> Decision {
        let quota = self.config.quotas.get(class);
        let entry = Arc::clone(
            self.clients
                .entry((client.to_string(), class))
                .or_insert_with(|| {
                    Arc::new(Mutex::new(ClientQuotaState {
                        requests_in_window: 0,
                        window_reset_at: now + quota.window,
                        consecutive_denials: 0,
                        last_request_at: now,
                        associated_user_id: client.user_id(),
                    }))
                })
                .value(),
        );

        let mut state = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if now > state.window_reset_at {
            state.requests_in_window = 0;
            state.window_reset_at = now + quota.window;
            state.consecutive_denials = 0;
        }

        let limit = adjusted_limit(
            &self.config.policy,
            quota.limit,
            class,
            client.is_authenticated(),
            state.consecutive_denials,
            local_hour,
        );

        if state.requests_in_window >= limit {
            state.consecutive_denials = state.consecutive_denials.saturating_add(1);
            return Decision::Denied(Denied {
                class,
                limit,
                reset_at: state.window_reset_at,
                window: quota.window,
            });
        }

        state.requests_in_window += 1;
        state.last_request_at = now;
        Decision::Allowed(Admitted {
            class,
            limit,
            remaining: limit - state.requests_in_window,
            reset_at: state.window_reset_at,
            window: quota.window,
        })
    }

    fn is_stale(&self, entry: &QuotaEntry, now: DateTime<Utc>) -> bool {
        let state = entry.lock().unwrap_or_else(PoisonError::into_inner);
        now > state.window_reset_at + self.config.stale_grace
    }

    /// Drop entries whose window closed more than the grace period before `now`.
    ///
    /// Each entry is locked only long enough to read its reset time. Returns
    /// the number of entries removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<QuotaKey> = self
            .clients
            .iter()
            .filter(|e| self.is_stale(e.value(), now))
            .map(|e| e.key().clone())
            .collect();

        let removed = stale
            .iter()
            .filter(|key| {
                self.clients
                    .remove_if(*key, |_, entry| self.is_stale(entry, now))
                    .is_some()
            })
            .count();
        debug!(removed, remaining = self.clients.len(), "swept quota entries");
        removed
    }

    pub fn usage(&self) -> LimiterUsage {
        self.usage_at(Utc::now())
    }

    /// Count distinct clients, as of `now`.
    pub fn usage_at(&self, now: DateTime<Utc>) -> LimiterUsage {
        let mut clients = HashSet::new();
        let mut active = HashSet::new();
        let mut authenticated = HashSet::new();
        let mut tracked_entries = 0;

        for entry in self.clients.iter() {
            tracked_entries += 1;
            let identity = &entry.key().0;
            let state = entry.value().lock().unwrap_or_else(PoisonError::into_inner);
            clients.insert(identity.clone());
            if now - state.last_request_at < self.config.active_window {
                active.insert(identity.clone());
            }
            if state.associated_user_id.is_some() {
                authenticated.insert(identity.clone());
            }
        }

        LimiterUsage {
            total_clients: clients.len(),
            active_clients: active.len(),
            authenticated: authenticated.len(),
            anonymous: clients.len() - authenticated.len(),
            tracked_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Outside the default peak band.
    const OFF_PEAK: u32 = 10;
    const PEAK: u32 = 20;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn anon() -> ClientKey {
        ClientKey::anonymous("1.2.3.4", "test")
    }

    fn neutral_limiter() -> AdmissionLimiter {
        AdmissionLimiter::new(LimiterConfig {
            policy: AdaptivePolicy::neutral(),
            ..LimiterConfig::default()
        })
    }

    fn allowed_count(
        limiter: &AdmissionLimiter,
        class: EndpointClass,
        client: &ClientKey,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> u32 {
        (0..attempts)
            .filter(|_| limiter.check_at(class, client, now, OFF_PEAK).is_allowed())
            .count() as u32
    }

    #[test]
    fn client_key_formats() {
        let id = Uuid::new_v4();
        assert_eq!(ClientKey::User(id).to_string(), format!("user:{id}"));
        assert_eq!(anon().to_string(), "ip:1.2.3.4:ua:test");
    }

    #[test]
    fn user_agent_truncated_on_char_boundary() {
        let ua = "é".repeat(80);
        let ClientKey::Anonymous { user_agent, .. } = ClientKey::anonymous("ip", &ua) else {
            unreachable!()
        };
        assert_eq!(user_agent.chars().count(), USER_AGENT_MAX_CHARS);
    }

    #[test]
    fn adjustments_apply_in_order() {
        let p = AdaptivePolicy::default();
        let c = EndpointClass::Community;
        assert_eq!(adjusted_limit(&p, 60, c, false, 1, OFF_PEAK), 60);
        assert_eq!(adjusted_limit(&p, 60, c, true, 1, OFF_PEAK), 90);
        assert_eq!(adjusted_limit(&p, 60, c, true, 0, OFF_PEAK), 108);
        assert_eq!(adjusted_limit(&p, 60, c, true, 0, PEAK), 140);
        assert_eq!(adjusted_limit(&p, 10, EndpointClass::Auth, false, 0, OFF_PEAK), 12);
    }

    #[test]
    fn crisis_overwrites_authenticated_bonus() {
        let p = AdaptivePolicy::default();
        let crisis = EndpointClass::Crisis;
        assert_eq!(adjusted_limit(&p, 200, crisis, false, 1, OFF_PEAK), 600);
        assert_eq!(adjusted_limit(&p, 200, crisis, true, 1, OFF_PEAK), 600);
        assert_eq!(adjusted_limit(&p, 200, crisis, true, 0, PEAK), 936);
    }

    #[test]
    fn peak_band_is_inclusive() {
        let p = AdaptivePolicy::default();
        let c = EndpointClass::Public;
        assert_eq!(adjusted_limit(&p, 20, c, false, 1, 17), 20);
        assert_eq!(adjusted_limit(&p, 20, c, false, 1, 18), 26);
        assert_eq!(adjusted_limit(&p, 20, c, false, 1, 23), 26);
    }

    #[test]
    fn exactly_base_limit_allowed_then_resets() {
        let limiter = neutral_limiter();
        let client = anon();
        let now = t0();

        assert_eq!(allowed_count(&limiter, EndpointClass::Auth, &client, 10, now), 10);
        let Decision::Denied(denied) =
            limiter.check_at(EndpointClass::Auth, &client, now + Duration::seconds(5), OFF_PEAK)
        else {
            panic!("11th request should be denied");
        };
        assert_eq!(denied.reset_at, now + Duration::seconds(60));
        assert_eq!(denied.retry_after_secs(now + Duration::seconds(5)), 55);

        let later = now + Duration::seconds(61);
        assert_eq!(allowed_count(&limiter, EndpointClass::Auth, &client, 11, later), 10);
    }

    #[test]
    fn good_behavior_bonus_lost_after_denial() {
        let limiter = AdmissionLimiter::new(LimiterConfig::default());
        let client = anon();
        let now = t0();

        // 10 * 1.2 while clean.
        assert_eq!(allowed_count(&limiter, EndpointClass::Auth, &client, 20, now), 12);
        let Decision::Denied(denied) = limiter.check_at(EndpointClass::Auth, &client, now, OFF_PEAK)
        else {
            panic!("expected denial");
        };
        assert_eq!(denied.limit, 10);
    }

    #[test]
    fn authenticated_ceiling_exceeds_anonymous() {
        let limiter = AdmissionLimiter::new(LimiterConfig::default());
        let now = t0();
        let user = ClientKey::User(Uuid::new_v4());
        let class = EndpointClass::Community;

        let anon_allowed = allowed_count(&limiter, class, &anon(), 500, now);
        let user_allowed = allowed_count(&limiter, class, &user, 500, now);
        assert!(user_allowed > anon_allowed, "{user_allowed} <= {anon_allowed}");
    }

    #[test]
    fn classes_and_clients_count_separately() {
        let limiter = neutral_limiter();
        let now = t0();
        let other = ClientKey::anonymous("5.6.7.8", "test");

        assert_eq!(allowed_count(&limiter, EndpointClass::Auth, &anon(), 10, now), 10);
        assert!(!limiter.check_at(EndpointClass::Auth, &anon(), now, OFF_PEAK).is_allowed());
        assert!(limiter.check_at(EndpointClass::Public, &anon(), now, OFF_PEAK).is_allowed());
        assert!(limiter.check_at(EndpointClass::Auth, &other, now, OFF_PEAK).is_allowed());
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = neutral_limiter();
        let decision = limiter.check_at(EndpointClass::Auth, &anon(), t0(), OFF_PEAK);
        let Decision::Allowed(first) = decision else {
            panic!("expected admission");
        };
        assert_eq!(first.limit, 10);
        assert_eq!(first.remaining, 9);
    }

    #[test]
    fn sweep_drops_only_stale_entries() {
        let limiter = neutral_limiter();
        let now = t0();
        limiter.check_at(EndpointClass::Auth, &anon(), now, OFF_PEAK);
        limiter.check_at(
            EndpointClass::Auth,
            &ClientKey::anonymous("9.9.9.9", "x"),
            now + Duration::minutes(30),
            OFF_PEAK,
        );

        // First window closed at +1m, grace ends at +61m.
        assert_eq!(limiter.sweep_at(now + Duration::minutes(60)), 0);
        assert_eq!(limiter.sweep_at(now + Duration::minutes(62)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn usage_counts_distinct_clients() {
        let limiter = neutral_limiter();
        let now = t0();
        let user = ClientKey::User(Uuid::new_v4());
        limiter.check_at(EndpointClass::Auth, &anon(), now - Duration::minutes(10), OFF_PEAK);
        limiter.check_at(EndpointClass::Chat, &user, now, OFF_PEAK);
        limiter.check_at(EndpointClass::Community, &user, now, OFF_PEAK);

        let usage = limiter.usage_at(now);
        assert_eq!(
            usage,
            LimiterUsage {
                total_clients: 2,
                active_clients: 1,
                authenticated: 1,
                anonymous: 1,
                tracked_entries: 3,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_burst_is_counted_exactly() {
        let limiter = Arc::new(neutral_limiter());
        let now = t0();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..200 {
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                limiter
                    .check_at(EndpointClass::Community, &anon(), now, OFF_PEAK)
                    .is_allowed()
            });
        }

        let mut allowed = 0;
        let mut denied = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                allowed += 1;
            } else {
                denied += 1;
            }
        }
        assert_eq!(allowed, 60);
        assert_eq!(denied, 140);
    }
}
