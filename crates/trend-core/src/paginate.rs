//! Accumulated ranking across pages, and how much of it is visible.
//!
//! Pagination is not a stable append. Each new page is unioned into the set by
//! key (last write wins) and the whole union is re-sorted, so items can move
//! between loads. Rails that need a fixed order use `PagingMode::Snapshot`.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::group::{KeyStrategy, ScoredGroup};
use crate::model::TrendingItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// Fetch a page, merge, re-rank the union.
    #[default]
    Rerank,
    /// Rank once over several pages fetched up front, then page through that.
    Snapshot,
}

/// Descending score; ties go to the busier group, then to the smaller key.
pub fn rank_order(a: &ScoredGroup, b: &ScoredGroup) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.log_count().cmp(&a.log_count()))
        .then_with(|| a.key.cmp(&b.key))
}

pub fn sort_ranked(groups: &mut [ScoredGroup]) {
    groups.sort_by(rank_order);
}

/// Keyed union of scored groups, kept sorted.
#[derive(Debug, Clone, Default)]
pub struct RankedSet {
    by_key: HashMap<String, usize>,
    ranked: Vec<ScoredGroup>,
}

impl RankedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn groups(&self) -> &[ScoredGroup] {
        &self.ranked
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.ranked.clear();
    }

    /// Union `groups` in by key, replacing duplicates, then re-sort.
    pub fn merge(&mut self, groups: Vec<ScoredGroup>) {
        for group in groups {
            match self.by_key.get(&group.key) {
                Some(&i) => self.ranked[i] = group,
                None => {
                    self.by_key.insert(group.key.clone(), self.ranked.len());
                    self.ranked.push(group);
                }
            }
        }
        sort_ranked(&mut self.ranked);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_key.clear();
        for (i, g) in self.ranked.iter().enumerate() {
            self.by_key.insert(g.key.clone(), i);
        }
    }

    pub fn items(&self, strategy: KeyStrategy, limit: usize) -> Vec<TrendingItem> {
        self.ranked
            .iter()
            .take(limit)
            .filter_map(|g| g.to_item(strategy))
            .collect()
    }
}

/// How many ranked items are shown, and by how much "load more" raises that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayWindow {
    pub visible: usize,
    pub step: usize,
}

impl DisplayWindow {
    pub fn new(step: usize) -> Self {
        Self {
            visible: step,
            step,
        }
    }

    pub fn reset(&mut self) {
        self.visible = self.step;
    }

    /// True when items already ranked are still hidden.
    pub fn has_hidden(&self, ranked: usize) -> bool {
        ranked > self.visible
    }

    pub fn grow(&mut self) {
        self.visible += self.step;
    }
}
