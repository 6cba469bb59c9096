//! Throttle/backoff governor.
//!
//! Classifies adapter errors and computes rate-limit backoff. Adapter errors
//! never reach the orchestrator's decision logic unclassified.

use crate::adapter::AdapterError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Upper bound on any computed backoff delay.
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Horizon assumed for quota exhaustion when the vendor gives no retry hint.
pub const QUOTA_RESET_HORIZON_SECS: i64 = 3600;

/// Delay used while a quota-reset horizon is unexpired.
pub const QUOTA_EXHAUSTED_DELAY_SECS: u64 = 900;

/// Maximum jitter added to a retry-after hint.
const BACKOFF_JITTER_MAX_SECS: u64 = 5;

/// Failure classes the orchestrator reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Quota exhaustion — recoverable via scheduled backoff.
    RateLimited,
    /// 5xx or transport failure — recoverable via queue redelivery.
    Transient,
    /// 404 on a possibly-removed sub-target — bounded retry, then removal.
    NotFound,
    /// Auth/config failure — operator intervention required.
    Fatal,
}

/// Result of classifying one adapter error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retry_after_secs: Option<u64>,
}

/// Classify an adapter error.
///
/// The vendor's own rate-limit signal wins over the status code (GitHub-style
/// APIs rate-limit on 403); 404 is bounded-retry; 401/403 and remaining 4xx
/// are fatal; 5xx and transport failures are transient.
pub fn classify(err: &AdapterError) -> Classification {
    let kind = if err.rate_limited || err.status == Some(429) {
        ErrorKind::RateLimited
    } else {
        match err.status {
            Some(404) => ErrorKind::NotFound,
            Some(s) if (500..600).contains(&s) => ErrorKind::Transient,
            Some(_) => ErrorKind::Fatal,
            None => ErrorKind::Transient,
        }
    };

    Classification {
        kind,
        retry_after_secs: err.retry_after_secs,
    }
}

/// Backoff decision for a rate-limited stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPlan {
    /// Delay before the next poll attempt.
    pub delay_secs: u64,
    /// Set when the vendor gave no retry hint: the adapter is not called
    /// again until this horizon passes.
    pub quota_reset_at: Option<DateTime<Utc>>,
}

/// Compute the next poll delay after a rate-limit error.
///
/// With a retry-after hint: `min(current + hint + jitter(0..=5s), cap)`.
/// Without one: assume the quota resets in an hour and hold a long fixed
/// delay until then.
pub fn rate_limit_backoff(
    now: DateTime<Utc>,
    current_delay_secs: u64,
    retry_after_secs: Option<u64>,
    max_poll_interval_secs: u64,
) -> RateLimitPlan {
    match retry_after_secs {
        Some(hint) => {
            let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MAX_SECS);
            let delay = current_delay_secs
                .saturating_add(hint)
                .saturating_add(jitter)
                .min(max_poll_interval_secs);
            RateLimitPlan {
                delay_secs: delay,
                quota_reset_at: None,
            }
        }
        None => RateLimitPlan {
            delay_secs: QUOTA_EXHAUSTED_DELAY_SECS.min(max_poll_interval_secs),
            quota_reset_at: Some(now + Duration::seconds(QUOTA_RESET_HORIZON_SECS)),
        },
    }
}

/// Delay to apply while an unexpired quota horizon is stored on the stream:
/// the fixed long delay, shortened when the horizon expires sooner.
pub fn horizon_wait_secs(now: DateTime<Utc>, quota_reset_at: DateTime<Utc>) -> u64 {
    let remaining = (quota_reset_at - now).num_seconds().max(1) as u64;
    remaining.min(QUOTA_EXHAUSTED_DELAY_SECS)
}
