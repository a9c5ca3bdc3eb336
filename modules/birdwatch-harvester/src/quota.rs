use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use birdwatch_common::HarvestError;

use crate::traits::{RateLimitKey, StatusSource};

/// Enforces source-API rate-limit backoff. The wait-and-retry loop never
/// gives a subject up to quota alone, but cumulative wait per subject is
/// capped so an endless quota window cannot stall the whole run.
pub struct QuotaGovernor {
    max_total_wait: Duration,
}

impl QuotaGovernor {
    pub fn new(max_total_wait: Duration) -> Self {
        Self { max_total_wait }
    }

    /// Wait out the current limit window for `key`. `waited` accumulates
    /// across calls within one subject scan; once the next wait would
    /// cross the cap the subject fails with `QuotaTimeout` instead of
    /// sleeping.
    ///
    /// Unreadable limit state is fatal for the current subject only.
    pub async fn await_quota(
        &self,
        source: &dyn StatusSource,
        key: RateLimitKey,
        subject: &str,
        waited: &mut Duration,
    ) -> Result<(), HarvestError> {
        let window = source
            .rate_limit_window(key)
            .await
            .map_err(|e| HarvestError::QuotaUnavailable(e.to_string()))?
            .ok_or_else(|| {
                HarvestError::QuotaUnavailable(format!(
                    "no window reported for {}{}",
                    key.resource, key.endpoint
                ))
            })?;

        let wait_secs = window.reset - Utc::now().timestamp();
        if wait_secs <= 0 {
            info!(subject, endpoint = key.endpoint, "rate limit window already reset");
            return Ok(());
        }

        let wait = Duration::from_secs(wait_secs as u64);
        if *waited + wait > self.max_total_wait {
            warn!(
                subject,
                waited_secs = waited.as_secs(),
                next_wait_secs = wait.as_secs(),
                cap_secs = self.max_total_wait.as_secs(),
                "quota wait cap exceeded"
            );
            return Err(HarvestError::QuotaTimeout {
                subject: subject.to_string(),
                waited_secs: (*waited + wait).as_secs(),
            });
        }

        *waited += wait;
        info!(
            subject,
            endpoint = key.endpoint,
            wait_secs,
            remaining = window.remaining,
            "quota exhausted, sleeping until reset"
        );
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use crate::traits::SEARCH_LIMIT_KEY;
    use twitter_client::RateLimitWindow;

    fn window_resetting_in(secs: i64) -> RateLimitWindow {
        RateLimitWindow {
            limit: 180,
            remaining: 0,
            reset: Utc::now().timestamp() + secs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_until_the_reported_reset() {
        let source = ScriptedSource::new().with_window(window_resetting_in(6));
        let governor = QuotaGovernor::new(Duration::from_secs(3600));
        let mut waited = Duration::ZERO;

        let before = tokio::time::Instant::now();
        governor
            .await_quota(&source, SEARCH_LIMIT_KEY, "someorg", &mut waited)
            .await
            .unwrap();

        assert!(before.elapsed() >= Duration::from_secs(5));
        assert!(waited >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_sleep_past_reset() {
        let source = ScriptedSource::new().with_window(window_resetting_in(-10));
        let governor = QuotaGovernor::new(Duration::from_secs(3600));
        let mut waited = Duration::ZERO;

        let before = tokio::time::Instant::now();
        governor
            .await_quota(&source, SEARCH_LIMIT_KEY, "someorg", &mut waited)
            .await
            .unwrap();

        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_cap_converts_blocking_into_failure() {
        let source = ScriptedSource::new().with_window(window_resetting_in(120));
        let governor = QuotaGovernor::new(Duration::from_secs(60));
        let mut waited = Duration::ZERO;

        let err = governor
            .await_quota(&source, SEARCH_LIMIT_KEY, "someorg", &mut waited)
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::QuotaTimeout { .. }));
    }

    #[tokio::test]
    async fn unreadable_limit_state_fails_the_subject() {
        let source = ScriptedSource::new(); // no window registered
        let governor = QuotaGovernor::new(Duration::from_secs(3600));
        let mut waited = Duration::ZERO;

        let err = governor
            .await_quota(&source, SEARCH_LIMIT_KEY, "someorg", &mut waited)
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::QuotaUnavailable(_)));
    }
}
