//! Partitioning records into groups by content key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ItemType, LogRecord, TrendingItem};

/// How a rail derives the grouping key from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Single-type rails (songs, albums).
    #[default]
    ItemId,
    /// Rails mixing songs, albums and artists: `"{type}|{id}"`.
    Composite,
    /// Artist rollups. Names are trimmed and lower-cased.
    ArtistName,
}

impl KeyStrategy {
    pub fn key(&self, record: &LogRecord) -> String {
        match self {
            Self::ItemId     => record.item_id.clone(),
            Self::Composite  => format!("{}|{}", record.item_type, record.item_id),
            Self::ArtistName => normalize_artist(&record.artist_name),
        }
    }
}

pub fn normalize_artist(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Records sharing a key. `members[0]` is the representative for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGroup {
    pub key: String,
    pub members: Vec<LogRecord>,
    pub score: f64,
}

impl ScoredGroup {
    pub fn new(key: String, members: Vec<LogRecord>) -> Self {
        Self {
            key,
            members,
            score: 0.0,
        }
    }

    pub fn log_count(&self) -> usize {
        self.members.len()
    }

    /// Mean of the ratings that are present.
    pub fn average_rating(&self) -> Option<f64> {
        let (sum, n) = self
            .members
            .iter()
            .filter_map(|m| m.rating)
            .fold((0u32, 0u32), |(s, n), r| (s + r as u32, n + 1));
        if n == 0 {
            None
        } else {
            Some(sum as f64 / n as f64)
        }
    }

    pub fn representative(&self) -> Option<&LogRecord> {
        self.members.first()
    }

    /// Display record. `None` only for an empty group.
    pub fn to_item(&self, strategy: KeyStrategy) -> Option<TrendingItem> {
        let rep = self.representative()?;
        let artist_rollup =
            strategy == KeyStrategy::ArtistName || rep.item_type == ItemType::Artist;
        let (title, subtitle) = if artist_rollup {
            (rep.artist_name.clone(), None)
        } else {
            (rep.title.clone(), Some(rep.artist_name.clone()))
        };
        Some(TrendingItem {
            id: self.key.clone(),
            title,
            subtitle,
            artwork_url: rep.artwork_url.clone(),
            log_count: self.log_count(),
            average_rating: self.average_rating(),
            item_type: if strategy == KeyStrategy::ArtistName {
                ItemType::Artist
            } else {
                rep.item_type
            },
            item_id: rep.item_id.clone(),
            score: self.score,
        })
    }
}

/// Every record lands in exactly one group. Groups come out in order of first
/// appearance; members keep input order.
pub fn group_records(records: Vec<LogRecord>, strategy: KeyStrategy) -> Vec<ScoredGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ScoredGroup> = Vec::new();

    for record in records {
        let key = strategy.key(&record);
        match index.get(&key) {
            Some(&i) => groups[i].members.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ScoredGroup::new(key, vec![record]));
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(id: &str, ty: ItemType, artist: &str, rating: Option<u8>) -> LogRecord {
        let mut r = LogRecord::new(id, ty, format!("title {id}"), artist, "u1", Utc::now());
        r.rating = rating;
        r
    }

    #[test]
    fn test_keys() {
        let r = rec("42", ItemType::Album, "  Björk ", None);
        assert_eq!(KeyStrategy::ItemId.key(&r), "42");
        assert_eq!(KeyStrategy::Composite.key(&r), "album|42");
        assert_eq!(KeyStrategy::ArtistName.key(&r), "björk");
    }

    #[test]
    fn test_composite_separates_types_with_same_id() {
        let records = vec![
            rec("1", ItemType::Song, "a", None),
            rec("1", ItemType::Album, "a", None),
            rec("1", ItemType::Song, "a", None),
        ];
        let by_id = group_records(records.clone(), KeyStrategy::ItemId);
        assert_eq!(by_id.len(), 1);
        let composite = group_records(records, KeyStrategy::Composite);
        assert_eq!(composite.len(), 2);
        assert_eq!(composite[0].key, "song|1");
        assert_eq!(composite[0].log_count(), 2);
    }

    #[test]
    fn test_artist_names_fold_case() {
        let records = vec![
            rec("1", ItemType::Song, "Radiohead", None),
            rec("2", ItemType::Song, "radiohead ", None),
            rec("3", ItemType::Song, "Portishead", None),
        ];
        let groups = group_records(records, KeyStrategy::ArtistName);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].log_count(), 2);
    }

    #[test]
    fn test_average_rating_ignores_unrated() {
        let g = ScoredGroup::new(
            "k".into(),
            vec![
                rec("1", ItemType::Song, "a", Some(5)),
                rec("1", ItemType::Song, "a", None),
                rec("1", ItemType::Song, "a", Some(2)),
            ],
        );
        assert_eq!(g.average_rating(), Some(3.5));

        let unrated = ScoredGroup::new("k".into(), vec![rec("1", ItemType::Song, "a", None)]);
        assert_eq!(unrated.average_rating(), None);
    }

    #[test]
    fn test_to_item_uses_representative() {
        let mut first = rec("s1", ItemType::Song, "Artist A", Some(4));
        first.artwork_url = Some("https://img/1.jpg".into());
        let g = ScoredGroup::new("s1".into(), vec![first, rec("s1", ItemType::Song, "Other", None)]);
        let item = g.to_item(KeyStrategy::ItemId).unwrap();
        assert_eq!(item.title, "title s1");
        assert_eq!(item.subtitle.as_deref(), Some("Artist A"));
        assert_eq!(item.artwork_url.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(item.log_count, 2);

        let artist = g.to_item(KeyStrategy::ArtistName).unwrap();
        assert_eq!(artist.title, "Artist A");
        assert_eq!(artist.subtitle, None);
        assert_eq!(artist.item_type, ItemType::Artist);
    }
}
