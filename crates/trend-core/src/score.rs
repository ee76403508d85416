//! Ordering scores for groups.
//!
//! Scores only order groups within one rail and one refresh. They carry no
//! absolute meaning and are never compared across rails.
//!
//! ## Trending score
//!
//! ```text
//! recency   = mean over members of max(0, 24 − hours_since) / 24
//! diversity = min(distinct users, 10) / 10
//! score     = count·3.0 + avg_rating·2.0 + recency·1.5 + diversity·1.0
//! ```
//!
//! `avg_rating` falls back to 3.0 for unrated groups. The count term is
//! unbounded while the others are not, so volume decides the ranking and the
//! rest break ties between similarly active items.
//!
//! ## Friends score
//!
//! Used when the pool is restricted to mutual follows. Sums a per-record
//! engagement value, so quality of interaction counts more than raw volume.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::ScoredGroup;
use crate::model::LogRecord;

pub const RECENCY_HORIZON_HOURS: f64 = 24.0;
pub const DIVERSITY_CAP: usize = 10;
pub const NEUTRAL_RATING: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    #[default]
    Trending,
    Friends,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendingWeights {
    pub count: f64,
    pub rating: f64,
    pub recency: f64,
    pub diversity: f64,
}

impl Default for TrendingWeights {
    fn default() -> Self {
        Self {
            count: 3.0,
            rating: 2.0,
            recency: 1.5,
            diversity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FriendsWeights {
    pub helpful: f64,
    pub comments: f64,
    pub likes: f64,
    pub rating: f64,
    pub unhelpful_penalty: f64,
}

impl Default for FriendsWeights {
    fn default() -> Self {
        Self {
            helpful: 2.0,
            comments: 1.5,
            likes: 1.0,
            rating: 1.0,
            unhelpful_penalty: 2.0,
        }
    }
}

/// Both weight sets; a rail picks one through its `ScoreKind`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Weights {
    #[serde(default)]
    pub trending: TrendingWeights,
    #[serde(default)]
    pub friends: FriendsWeights,
}

impl Weights {
    pub fn score(&self, kind: ScoreKind, group: &ScoredGroup, now: DateTime<Utc>) -> f64 {
        match kind {
            ScoreKind::Trending => trending_score(group, now, &self.trending),
            ScoreKind::Friends  => friends_score(group, &self.friends),
        }
    }
}

/// Fractional hours since `at`. Future timestamps count as zero.
fn hours_since(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - at).num_milliseconds() as f64 / 1000.0;
    (secs / 3600.0).max(0.0)
}

/// 1.0 for "just now", decaying linearly to 0.0 at 24h and staying there.
pub fn recency_score(members: &[LogRecord], now: DateTime<Utc>) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let total: f64 = members
        .iter()
        .map(|m| {
            (RECENCY_HORIZON_HOURS - hours_since(m.date_logged, now)).max(0.0)
                / RECENCY_HORIZON_HOURS
        })
        .sum();
    total / members.len() as f64
}

pub fn diversity_score(members: &[LogRecord]) -> f64 {
    let distinct: HashSet<&str> = members.iter().map(|m| m.user_id.as_str()).collect();
    distinct.len().min(DIVERSITY_CAP) as f64 / DIVERSITY_CAP as f64
}

/// Raw trending score from already-reduced terms.
pub fn combine(
    log_count: usize,
    average_rating: Option<f64>,
    recency: f64,
    diversity: f64,
    w: &TrendingWeights,
) -> f64 {
    log_count as f64 * w.count
        + average_rating.unwrap_or(NEUTRAL_RATING) * w.rating
        + recency * w.recency
        + diversity * w.diversity
}

pub fn trending_score(group: &ScoredGroup, now: DateTime<Utc>, w: &TrendingWeights) -> f64 {
    combine(
        group.log_count(),
        group.average_rating(),
        recency_score(&group.members, now),
        diversity_score(&group.members),
        w,
    )
}

pub fn engagement_score(record: &LogRecord, w: &FriendsWeights) -> f64 {
    record.helpful_votes as f64 * w.helpful
        + record.comment_count as f64 * w.comments
        + record.like_count as f64 * w.likes
        + record.rating.map(f64::from).unwrap_or(0.0) * w.rating
        - record.unhelpful_votes as f64 * w.unhelpful_penalty
}

pub fn friends_score(group: &ScoredGroup, w: &FriendsWeights) -> f64 {
    group.members.iter().map(|m| engagement_score(m, w)).sum()
}
