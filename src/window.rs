//! Collection window strategy.
//!
//! Computes the next `[since, until)` window for a stream from the previous
//! window's end, the current time, and a catch-up policy. A stream can fall
//! arbitrarily far behind real time (first run, extended outage, deploy gap);
//! the policy controls how fast the window span grows while catching up.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const HOUR_SECS: i64 = 3600;
const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 604_800;

/// Forced window span when the scheduler is running ahead of real time.
const AHEAD_CLAMP_SECS: i64 = 60;

/// A half-open `[since, until)` time range requested from a time-indexed API.
///
/// Invariant: `since <= until`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// Window span in seconds.
    pub fn span_secs(&self) -> i64 {
        (self.until - self.since).num_seconds()
    }
}

/// Rule governing how fast a window's span grows when the stream is behind
/// real time. Progression policies pick the largest tier whose threshold the
/// backlog exceeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatchUpPolicy {
    /// Always `poll_interval` — the stream never takes larger steps.
    NoCap,
    /// `poll_interval`, or 1 hour once the backlog exceeds 1 hour.
    HourCap,
    /// `poll_interval`, or 24 hours once the backlog exceeds 24 hours.
    DayCap,
    /// Graduated: `poll_interval` / 1 hour / 24 hours by backlog tier.
    HourDayProgression,
    /// Graduated: `poll_interval` / 1 day / 7 days by backlog tier. Used by
    /// APIs that reject windows older than a fixed retention.
    DayWeekProgression,
}

impl CatchUpPolicy {
    /// Step size in seconds for the given backlog.
    fn step_secs(&self, backlog_secs: i64, poll_interval_secs: u64) -> i64 {
        let interval = poll_interval_secs as i64;
        match self {
            CatchUpPolicy::NoCap => interval,
            CatchUpPolicy::HourCap => {
                if backlog_secs > HOUR_SECS {
                    HOUR_SECS
                } else {
                    interval
                }
            }
            CatchUpPolicy::DayCap => {
                if backlog_secs > DAY_SECS {
                    DAY_SECS
                } else {
                    interval
                }
            }
            CatchUpPolicy::HourDayProgression => {
                if backlog_secs > DAY_SECS {
                    DAY_SECS
                } else if backlog_secs > HOUR_SECS {
                    HOUR_SECS
                } else {
                    interval
                }
            }
            CatchUpPolicy::DayWeekProgression => {
                if backlog_secs > WEEK_SECS {
                    WEEK_SECS
                } else if backlog_secs > DAY_SECS {
                    DAY_SECS
                } else {
                    interval
                }
            }
        }
    }
}

/// The window to request next plus the delay before the cycle that requests
/// the one after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPlan {
    pub window: CollectionWindow,
    /// 1 second while catching up, the nominal poll interval at steady state.
    pub suggested_delay_secs: u64,
}

/// Compute the next collection window.
///
/// `since` is `min(previous_until, now)`: a previous end already in the
/// future is pulled back to `now`, otherwise it is kept so already-requested
/// ranges are never re-requested. `until` is `since` plus the policy step for
/// the current backlog, clamped so the window never runs more than
/// `margin_secs` ahead of `now`.
///
/// A missing `previous_until` (first run, unparseable persisted state) yields
/// a fresh `[now, now + poll_interval)` window.
pub fn next_window(
    previous_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    poll_interval_secs: u64,
    policy: CatchUpPolicy,
    margin_secs: u64,
) -> WindowPlan {
    let since = match previous_until {
        Some(prev) => prev.min(now),
        None => now,
    };

    let backlog_secs = (now - since).num_seconds();
    let step = Duration::seconds(policy.step_secs(backlog_secs, poll_interval_secs));
    let mut until = since + step;

    // Running ahead of schedule: keep the window short so the next cycle
    // still has something new to fetch.
    if (until - now).num_seconds() > margin_secs as i64 {
        until = since + Duration::seconds(AHEAD_CLAMP_SECS);
    }

    let behind_secs = (now - until).num_seconds();
    let suggested_delay_secs = if behind_secs > margin_secs as i64 {
        1
    } else {
        poll_interval_secs
    };

    WindowPlan {
        window: CollectionWindow { since, until },
        suggested_delay_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGIN: u64 = 600;

    fn at(secs_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::seconds(secs_ago)
    }

    #[test]
    fn test_first_run_synthesizes_fresh_window() {
        let now = Utc::now();
        let plan = next_window(None, now, 300, CatchUpPolicy::NoCap, MARGIN);
        assert_eq!(plan.window.since, now);
        assert_eq!(plan.window.span_secs(), 300);
        assert_eq!(plan.suggested_delay_secs, 300);
    }

    #[test]
    fn test_steady_state_advances_by_interval() {
        let now = Utc::now();
        let prev = now - Duration::seconds(60);
        let plan = next_window(Some(prev), now, 60, CatchUpPolicy::NoCap, MARGIN);
        assert_eq!(plan.window.since, prev);
        assert_eq!(plan.window.span_secs(), 60);
        assert_eq!(plan.suggested_delay_secs, 60);
    }

    #[test]
    fn test_future_previous_until_pulled_back_to_now() {
        let now = Utc::now();
        let prev = now + Duration::seconds(120);
        let plan = next_window(Some(prev), now, 60, CatchUpPolicy::NoCap, MARGIN);
        assert_eq!(plan.window.since, now);
    }

    #[test]
    fn test_hour_cap_limits_step() {
        let now = Utc::now();
        let plan = next_window(Some(at(7200)), now, 60, CatchUpPolicy::HourCap, MARGIN);
        assert_eq!(plan.window.span_secs(), 3600);
        // Two hours behind — catch-up mode
        assert_eq!(plan.suggested_delay_secs, 1);
    }

    #[test]
    fn test_hour_cap_small_backlog_uses_interval() {
        let now = Utc::now();
        let plan = next_window(Some(at(120)), now, 60, CatchUpPolicy::HourCap, MARGIN);
        assert_eq!(plan.window.span_secs(), 60);
    }

    #[test]
    fn test_day_cap_limits_step() {
        let now = Utc::now();
        let plan = next_window(
            Some(at(3 * 86_400)),
            now,
            60,
            CatchUpPolicy::DayCap,
            MARGIN,
        );
        assert_eq!(plan.window.span_secs(), 86_400);
    }

    /// Two days behind with hour-day progression takes a 24-hour step and
    /// retries immediately.
    #[test]
    fn test_two_day_backlog_hour_day_progression() {
        let now = Utc::now();
        let plan = next_window(
            Some(at(2 * 86_400)),
            now,
            60,
            CatchUpPolicy::HourDayProgression,
            MARGIN,
        );
        assert_eq!(plan.window.span_secs(), 86_400);
        assert_eq!(plan.suggested_delay_secs, 1);
    }

    #[test]
    fn test_hour_day_progression_middle_tier() {
        let now = Utc::now();
        let plan = next_window(
            Some(at(2 * 3600)),
            now,
            60,
            CatchUpPolicy::HourDayProgression,
            MARGIN,
        );
        assert_eq!(plan.window.span_secs(), 3600);
    }

    #[test]
    fn test_day_week_progression_tiers() {
        let now = Utc::now();
        let plan = next_window(
            Some(at(10 * 86_400)),
            now,
            60,
            CatchUpPolicy::DayWeekProgression,
            MARGIN,
        );
        assert_eq!(plan.window.span_secs(), 604_800);

        let plan = next_window(
            Some(at(3 * 86_400)),
            now,
            60,
            CatchUpPolicy::DayWeekProgression,
            MARGIN,
        );
        assert_eq!(plan.window.span_secs(), 86_400);
    }

    #[test]
    fn test_ahead_of_schedule_clamps_window() {
        let now = Utc::now();
        // Previous window ends in the future; a full interval step would land
        // the new window more than the margin ahead of now.
        let prev = now + Duration::seconds(30);
        let plan = next_window(Some(prev), now, 1800, CatchUpPolicy::NoCap, MARGIN);
        // since pulled back to now, until clamped to since + 60s
        assert_eq!(plan.window.since, now);
        assert_eq!(plan.window.span_secs(), 60);
    }

    /// Repeated application under any policy never overlaps and never stalls:
    /// `since_n <= until_n <= since_{n+1}`, and a large backlog converges to
    /// within one poll interval in bounded steps.
    #[test]
    fn test_catch_up_converges_and_stays_monotonic() {
        let now = Utc::now();
        let mut prev_until = now - Duration::seconds(5 * 86_400 + 123);
        let mut steps = 0;

        loop {
            let plan = next_window(
                Some(prev_until),
                now,
                60,
                CatchUpPolicy::HourDayProgression,
                MARGIN,
            );
            assert!(plan.window.since <= plan.window.until);
            assert_eq!(plan.window.since, prev_until.min(now));

            prev_until = plan.window.until;
            steps += 1;
            assert!(steps < 200, "window strategy failed to converge");

            if (now - prev_until).num_seconds() <= 60 {
                break;
            }
        }

        // 5 days: 5 day-steps, then hour-steps, then interval steps
        assert!(steps <= 40, "took {} steps", steps);
    }

    #[test]
    fn test_no_cap_never_takes_large_steps() {
        let now = Utc::now();
        let plan = next_window(Some(at(10 * 86_400)), now, 60, CatchUpPolicy::NoCap, MARGIN);
        assert_eq!(plan.window.span_secs(), 60);
        assert_eq!(plan.suggested_delay_secs, 1);
    }
}
