//! Outbound request pacing
//!
//! Every fetch and detail call of every run goes through one shared
//! [`ScrapeRateLimiter`]. It sleeps the configured pause, then waits on a
//! per-agency `governor` limiter so the aggregate request rate for an agency
//! stays under `requests_per_minute` even when several runs scrape the same
//! source at once. It never retries and never looks at content.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::error::FetchFailure;
use crate::domain::{Agency, RunLimits};

struct AgencyLimiter {
    requests_per_minute: u32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

/// Shared timing gate for all runs
#[derive(Default)]
pub struct ScrapeRateLimiter {
    limiters: Mutex<HashMap<Agency, AgencyLimiter>>,
}

impl std::fmt::Debug for ScrapeRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeRateLimiter").finish_non_exhaustive()
    }
}

impl ScrapeRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter for `agency` at the lowest ceiling any run has asked for.
    ///
    /// A run with a higher ceiling shares the stricter limiter. A lower
    /// ceiling replaces it with one whose first cell is already spent, so the
    /// switch never hands out an extra burst.
    fn limiter_for(&self, agency: Agency, requests_per_minute: u32) -> Arc<DefaultDirectRateLimiter> {
        let requests_per_minute = requests_per_minute.max(1);
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let previous = limiters.get(&agency);
        if let Some(entry) = previous {
            if entry.requests_per_minute <= requests_per_minute {
                return entry.limiter.clone();
            }
        }

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        // Burst of one spaces requests evenly instead of front-loading them.
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(quota));
        if let Some(entry) = previous {
            debug!(
                %agency,
                from = entry.requests_per_minute,
                to = requests_per_minute,
                "Tightening request ceiling"
            );
            let _ = limiter.check();
        }
        limiters.insert(
            agency,
            AgencyLimiter {
                requests_per_minute,
                limiter: limiter.clone(),
            },
        );
        limiter
    }

    /// Waits until the next request for `agency` may be sent.
    pub async fn throttle(&self, agency: Agency, limits: &RunLimits) {
        if limits.pause_between_pages_ms > 0 {
            debug!(%agency, pause_ms = limits.pause_between_pages_ms, "Pausing before fetch");
            tokio::time::sleep(Duration::from_millis(limits.pause_between_pages_ms)).await;
        }
        let limiter = self.limiter_for(agency, limits.requests_per_minute);
        limiter.until_ready().await;
    }

    /// Throttles, then runs `request` under the configured network timeout.
    pub async fn guarded<T, F>(&self, agency: Agency, limits: &RunLimits, request: F) -> Result<T, FetchFailure>
    where
        F: Future<Output = Result<T, FetchFailure>>,
    {
        self.throttle(agency, limits).await;
        let timeout_ms = limits.network_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), request).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::NetworkTimeout { timeout_ms }),
        }
    }
}
