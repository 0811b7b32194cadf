//! Background eviction of stale quota entries.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{AdmissionLimiter, LimiterConfig};

/// Owns the periodic sweep task of a limiter.
#[derive(Debug)]
pub struct SweepHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

impl AdmissionLimiter {
    /// Build a limiter and start its sweep.
    ///
    /// The sweep stops when `shutdown` is cancelled or the returned handle is
    /// shut down, whichever comes first.
    pub fn start(
        config: LimiterConfig,
        shutdown: &CancellationToken,
    ) -> (Arc<Self>, SweepHandle) {
        let limiter = Arc::new(Self::new(config));
        let handle = limiter.spawn_sweeper(shutdown.child_token());
        (limiter, handle)
    }

    /// Spawn a periodic sweep running until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> SweepHandle {
        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval;
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            info!(period_secs = period.as_secs(), "quota sweep started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        limiter.sweep_at(Utc::now());
                    }
                }
            }
            info!("quota sweep stopped");
        });
        SweepHandle { cancel, task }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::admission::{ClientKey, EndpointClass};

    fn fast_config() -> LimiterConfig {
        LimiterConfig {
            sweep_interval: StdDuration::from_millis(10),
            ..LimiterConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_task_evicts_stale_entries() {
        let shutdown = CancellationToken::new();
        let (limiter, handle) = AdmissionLimiter::start(fast_config(), &shutdown);

        let long_ago = Utc::now() - Duration::hours(3);
        limiter.check_at(
            EndpointClass::Public,
            &ClientKey::anonymous("1.2.3.4", "ua"),
            long_ago,
            10,
        );
        assert_eq!(limiter.len(), 1);

        tokio::time::sleep(StdDuration::from_millis(35)).await;
        assert!(limiter.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_sweep() {
        let shutdown = CancellationToken::new();
        let (_limiter, handle) = AdmissionLimiter::start(fast_config(), &shutdown);
        shutdown.cancel();
        tokio::time::timeout(StdDuration::from_secs(1), handle.task)
            .await
            .expect("sweep should exit on parent cancellation")
            .unwrap();
    }
}
