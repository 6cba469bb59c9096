use serde::{Deserialize, Serialize};

/// Scheduler limits and thresholds. Hard-coded defaults, overridable from
/// `TRAWLER_*` environment variables at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Maximum pages fetched in a single cycle before yielding with a
    /// continuation cursor.
    pub max_pages: u32,
    /// Margin (seconds) separating catch-up mode from steady state. A window
    /// ending more than this far behind `now` triggers an immediate retry; a
    /// window running more than this far ahead is clamped.
    pub lag_margin_secs: u64,
    /// Age (seconds) after which a PENDING work record is considered
    /// abandoned and may be reclaimed.
    pub liveness_threshold_secs: u64,
    /// Upper bound on any computed poll delay.
    pub max_poll_interval_secs: u64,
    /// Consecutive 404s tolerated before a stream is treated as gone.
    pub not_found_budget: u32,
    /// Consecutive transient failures before the persistent-failure hook
    /// fires.
    pub persistent_failure_threshold: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            lag_margin_secs: 600,
            liveness_threshold_secs: 900,
            max_poll_interval_secs: 3600,
            not_found_budget: 3,
            persistent_failure_threshold: 5,
        }
    }
}

impl CollectorConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("TRAWLER_MAX_PAGES") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.max_pages = n;
            }
        }
        if let Ok(v) = std::env::var("TRAWLER_LAG_MARGIN_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.lag_margin_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TRAWLER_LIVENESS_THRESHOLD_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.liveness_threshold_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TRAWLER_MAX_POLL_INTERVAL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                cfg.max_poll_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TRAWLER_NOT_FOUND_BUDGET") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.not_found_budget = n;
            }
        }
        if let Ok(v) = std::env::var("TRAWLER_PERSISTENT_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.persistent_failure_threshold = n;
            }
        }

        cfg
    }
}
