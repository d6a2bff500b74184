//! Rate-limit backoff for the GitHub API.
//!
//! Every worker shares one [`Backoff`]. Its extra wait grows while the API
//! keeps refusing requests and drops back to the baseline on the first
//! successful response, so a burst of workers hitting the limit together
//! spreads out instead of retrying in lockstep.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use tracing::warn;

use super::error::IdentityError;

const TOO_MANY_REQUESTS: u16 = 429;

/// Tuning for [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Extra wait after a reset.
    pub baseline: Duration,
    /// Upper bound for the extra wait.
    pub cap: Duration,
    /// Minimum time between two doublings.
    pub doubling_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            baseline: Duration::from_secs(1),
            cap: Duration::from_secs(3600),
            doubling_interval: Duration::from_secs(10),
        }
    }
}

/// Extra wait added on top of what the API asks for.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    last_doubled: Instant,
}

impl Backoff {
    /// Starts at the policy baseline.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.baseline,
            last_doubled: Instant::now(),
        }
    }

    /// Current extra wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Registers a rate-limited response at `now` and returns the extra
    /// wait to apply. Doubles the wait, up to the cap, when more than the
    /// doubling interval has passed since the previous doubling.
    pub fn escalate(&mut self, now: Instant) -> Duration {
        if now.saturating_duration_since(self.last_doubled) > self.policy.doubling_interval
            && self.current < self.policy.cap
        {
            self.current = (self.current * 2).min(self.policy.cap);
            self.last_doubled = now;
            warn!(
                backoff_secs = self.current.as_secs_f64(),
                "Doubling the additional rate-limit wait"
            );
        }
        self.current
    }

    /// Drops back to the baseline after a successful response.
    pub fn reset(&mut self) {
        self.current = self.policy.baseline;
    }
}

/// Rate-limit headers of a GitHub response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `retry-after`, in seconds.
    pub retry_after: Option<u64>,
    /// `x-ratelimit-remaining`.
    pub remaining: Option<u64>,
    /// `x-ratelimit-reset`, as a Unix epoch.
    pub reset_epoch: Option<u64>,
}

impl RateLimitHeaders {
    /// Extracts the rate-limit headers, ignoring malformed values.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        Self {
            retry_after: number("retry-after"),
            remaining: number("x-ratelimit-remaining"),
            reset_epoch: number("x-ratelimit-reset"),
        }
    }
}

/// Computes how long to sleep after a 403/429 response.
///
/// - an explicit `retry-after` wins: `backoff + retry_after`;
/// - a positive remaining quota is an inconsistent answer and an error;
/// - otherwise wait for the quota reset: `max(reset - now, 0) + backoff`.
///
/// Returns `Ok(None)` for a 403 that carries no rate-limit information at
/// all, i.e. a plain authorization failure.
pub fn rate_limit_delay(
    status: u16,
    headers: &RateLimitHeaders,
    backoff: Duration,
    now_epoch: u64,
) -> Result<Option<Duration>, IdentityError> {
    if let Some(retry_after) = headers.retry_after {
        return Ok(Some(backoff + Duration::from_secs(retry_after)));
    }

    match headers.remaining {
        Some(remaining) if remaining > 0 => {
            Err(IdentityError::InvalidRateLimitState { status, remaining })
        }
        None if status != TOO_MANY_REQUESTS && headers.reset_epoch.is_none() => Ok(None),
        _ => {
            let until_reset = headers
                .reset_epoch
                .map_or(0, |reset| reset.saturating_sub(now_epoch));
            Ok(Some(Duration::from_secs(until_reset) + backoff))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            baseline: Duration::from_secs(1),
            cap: Duration::from_secs(8),
            doubling_interval: Duration::from_secs(10),
        }
    }

    #[test]
    fn doubles_only_after_the_interval() {
        let mut backoff = Backoff::new(policy());
        let start = backoff.last_doubled;

        assert_eq!(backoff.escalate(start + Duration::from_secs(5)), Duration::from_secs(1));
        assert_eq!(backoff.escalate(start + Duration::from_secs(11)), Duration::from_secs(2));
        // interval is measured from the last doubling
        assert_eq!(backoff.escalate(start + Duration::from_secs(15)), Duration::from_secs(2));
        assert_eq!(backoff.escalate(start + Duration::from_secs(22)), Duration::from_secs(4));
    }

    #[test]
    fn doubling_is_capped_and_reset_restores_baseline() {
        let mut backoff = Backoff::new(policy());
        let start = backoff.last_doubled;
        for step in 1..=10 {
            backoff.escalate(start + Duration::from_secs(11 * step));
        }
        assert_eq!(backoff.current(), Duration::from_secs(8));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn retry_after_adds_to_backoff() {
        let headers = RateLimitHeaders {
            retry_after: Some(30),
            remaining: Some(100),
            reset_epoch: None,
        };
        let delay = rate_limit_delay(403, &headers, Duration::from_secs(2), 0).unwrap();
        assert_eq!(delay, Some(Duration::from_secs(32)));
    }

    #[test]
    fn exhausted_quota_waits_for_reset() {
        let headers = RateLimitHeaders {
            retry_after: None,
            remaining: Some(0),
            reset_epoch: Some(1_000_120),
        };
        let delay = rate_limit_delay(429, &headers, Duration::from_secs(1), 1_000_000).unwrap();
        assert!(delay.unwrap() >= Duration::from_secs(120));
    }

    #[test]
    fn reset_in_the_past_waits_only_the_backoff() {
        let headers = RateLimitHeaders {
            retry_after: None,
            remaining: Some(0),
            reset_epoch: Some(10),
        };
        let delay = rate_limit_delay(403, &headers, Duration::from_secs(1), 1_000).unwrap();
        assert_eq!(delay, Some(Duration::from_secs(1)));
    }

    #[test]
    fn remaining_quota_is_an_invalid_state() {
        let headers = RateLimitHeaders {
            retry_after: None,
            remaining: Some(12),
            reset_epoch: Some(10),
        };
        let err = rate_limit_delay(403, &headers, Duration::from_secs(1), 0).unwrap_err();
        assert!(matches!(
            err,
            IdentityError::InvalidRateLimitState { remaining: 12, .. }
        ));
    }

    #[test]
    fn plain_forbidden_is_not_a_rate_limit() {
        let delay =
            rate_limit_delay(403, &RateLimitHeaders::default(), Duration::from_secs(1), 0).unwrap();
        assert_eq!(delay, None);
    }

    #[test]
    fn parses_headers_and_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
        headers.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
        headers.insert("retry-after", "soon".parse().unwrap());

        let parsed = RateLimitHeaders::from_headers(&headers);
        assert_eq!(
            parsed,
            RateLimitHeaders {
                retry_after: None,
                remaining: Some(0),
                reset_epoch: Some(1_700_000_000),
            }
        );
    }
}
