//! One ranking pipeline shared by every rail.
//!
//! A rail is nothing but parameters: which records to fetch, how to key them,
//! what counts as eligible, and which score orders them. The stages are
//!
//!   hidden/blocked authors out → private logs out → group → eligible → score → sort

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::eligibility::EligibilityRule;
use crate::group::{group_records, KeyStrategy, ScoredGroup};
use crate::model::{ItemType, LogRecord, TrendingItem};
use crate::paginate::{sort_ranked, PagingMode};
use crate::score::{ScoreKind, Weights};
use crate::source::LogFilter;
use crate::window::WindowPolicy;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_DISPLAY_STEP: usize = 10;
pub const DEFAULT_SNAPSHOT_PAGES: usize = 3;

/// Whose activity a rail ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    #[default]
    Global,
    /// Only users the viewer follows who also follow back.
    Mutuals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailSpec {
    pub name: String,
    #[serde(default)]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub audience: Audience,
    #[serde(default)]
    pub window: WindowPolicy,
    #[serde(default)]
    pub key: KeyStrategy,
    #[serde(default)]
    pub eligibility: EligibilityRule,
    #[serde(default)]
    pub score: ScoreKind,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_display_step")]
    pub display_step: usize,
    #[serde(default)]
    pub paging: PagingMode,
    #[serde(default = "default_snapshot_pages")]
    pub snapshot_pages: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_display_step() -> usize {
    DEFAULT_DISPLAY_STEP
}

fn default_snapshot_pages() -> usize {
    DEFAULT_SNAPSHOT_PAGES
}

impl RailSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            item_type: None,
            genre: None,
            audience: Audience::Global,
            window: WindowPolicy::default(),
            key: KeyStrategy::ItemId,
            eligibility: EligibilityRule::default(),
            score: ScoreKind::Trending,
            page_size: DEFAULT_PAGE_SIZE,
            display_step: DEFAULT_DISPLAY_STEP,
            paging: PagingMode::Rerank,
            snapshot_pages: DEFAULT_SNAPSHOT_PAGES,
        }
    }

    pub fn songs() -> Self {
        Self {
            item_type: Some(ItemType::Song),
            ..Self::new("songs")
        }
    }

    pub fn albums() -> Self {
        Self {
            item_type: Some(ItemType::Album),
            ..Self::new("albums")
        }
    }

    pub fn artists() -> Self {
        Self {
            key: KeyStrategy::ArtistName,
            ..Self::new("artists")
        }
    }

    pub fn combined() -> Self {
        Self {
            key: KeyStrategy::Composite,
            ..Self::new("combined")
        }
    }

    pub fn genre(genre: impl Into<String>) -> Self {
        let genre = genre.into();
        Self {
            genre: Some(genre.clone()),
            key: KeyStrategy::Composite,
            ..Self::new(format!("genre:{}", genre))
        }
    }

    pub fn friends() -> Self {
        Self {
            audience: Audience::Mutuals,
            key: KeyStrategy::Composite,
            score: ScoreKind::Friends,
            page_size: 100,
            ..Self::new("friends")
        }
    }

    pub fn weekly() -> Self {
        Self {
            window: WindowPolicy::weekly(),
            key: KeyStrategy::Composite,
            page_size: 500,
            ..Self::new("weekly")
        }
    }

    /// Store-side filter for a window starting at `since`.
    pub fn filter(&self, since: DateTime<Utc>) -> LogFilter {
        LogFilter {
            item_type: self.item_type,
            genre: self.genre.clone(),
            authors: None,
            since: Some(since),
        }
    }
}

/// Users in both sets.
pub fn mutuals(following: &HashSet<String>, followers: &HashSet<String>) -> HashSet<String> {
    following.intersection(followers).cloned().collect()
}

/// Run the ranking stages over one batch of records.
pub fn rank_page(
    records: Vec<LogRecord>,
    hidden: &HashSet<String>,
    spec: &RailSpec,
    weights: &Weights,
    now: DateTime<Utc>,
) -> Vec<ScoredGroup> {
    let fetched = records.len();
    let visible: Vec<LogRecord> = records
        .into_iter()
        .filter(|r| !hidden.contains(&r.user_id))
        .filter(LogRecord::is_public)
        .collect();

    let groups = group_records(visible, spec.key);
    let group_count = groups.len();

    let mut eligible: Vec<ScoredGroup> = groups
        .into_iter()
        .filter(|g| spec.eligibility.is_eligible(g))
        .map(|mut g| {
            g.score = weights.score(spec.score, &g, now);
            g
        })
        .collect();
    sort_ranked(&mut eligible);

    debug!(
        "[{}] ranked {} records → {} groups → {} eligible",
        spec.name,
        fetched,
        group_count,
        eligible.len()
    );
    eligible
}

/// Synthetic items for a rail with nothing eligible. Intentionally inert: an
/// empty rail renders its placeholder state instead.
pub fn fallback_trending(_spec: &RailSpec) -> Vec<TrendingItem> {
    Vec::new()
}
