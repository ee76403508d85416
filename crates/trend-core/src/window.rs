//! Lower bound of the "recent activity" window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_HOURS: u32 = 24;
pub const WEEK_HOURS: u32 = 7 * 24;

/// `now − 24h`.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(DEFAULT_WINDOW_HOURS as i64)
}

/// Window span plus an optional widening ladder.
///
/// With an empty `widen_hours` (the default) the window is fixed. When a
/// ladder is configured, a rail whose first page holds fewer than
/// `min_records` records retries with the next wider span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPolicy {
    #[serde(default = "default_window_hours")]
    pub hours: u32,
    #[serde(default)]
    pub widen_hours: Vec<u32>,
    #[serde(default)]
    pub min_records: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            hours: default_window_hours(),
            widen_hours: Vec::new(),
            min_records: 0,
        }
    }
}

fn default_window_hours() -> u32 {
    DEFAULT_WINDOW_HOURS
}

impl WindowPolicy {
    pub fn fixed(hours: u32) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    pub fn weekly() -> Self {
        Self::fixed(WEEK_HOURS)
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        start_for(now, self.hours)
    }

    /// Next span to try after `current_hours` yielded `found` records.
    pub fn widen(&self, current_hours: u32, found: usize) -> Option<u32> {
        if found >= self.min_records {
            return None;
        }
        self.widen_hours
            .iter()
            .copied()
            .find(|&h| h > current_hours)
    }
}

pub fn start_for(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    now - Duration::hours(hours as i64)
}
