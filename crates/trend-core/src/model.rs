//! Activity records and the display records derived from them.
//!
//! A `LogRecord` is one user event ("u1 rated song X at time T"). Records are
//! decoded leniently from the document store's JSON: anything that does not
//! parse, or carries a rating outside 1..=5, is dropped before grouping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Item type ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Song,
    Album,
    Artist,
}

impl ItemType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Song   => "song",
            Self::Album  => "album",
            Self::Artist => "artist",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── LogRecord ─────────────────────────────────────────────────────────────────

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub item_id: String,
    pub item_type: ItemType,
    pub title: String,
    pub artist_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub date_logged: DateTime<Utc>,
    pub user_id: String,
    /// Absent means public.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub helpful_votes: u32,
    #[serde(default)]
    pub unhelpful_votes: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub like_count: u32,
}

impl LogRecord {
    /// Minimal record; engagement counters start at zero.
    pub fn new(
        item_id: impl Into<String>,
        item_type: ItemType,
        title: impl Into<String>,
        artist_name: impl Into<String>,
        user_id: impl Into<String>,
        date_logged: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            item_type,
            title: title.into(),
            artist_name: artist_name.into(),
            artwork_url: None,
            rating: None,
            date_logged,
            user_id: user_id.into(),
            is_public: None,
            genres: Vec::new(),
            helpful_votes: 0,
            unhelpful_votes: 0,
            comment_count: 0,
            like_count: 0,
        }
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn is_public(&self) -> bool {
        self.is_public.unwrap_or(true)
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }

    /// Decode one document. Returns `None` for anything malformed.
    pub fn decode(value: serde_json::Value) -> Option<Self> {
        let record: Self = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                debug!("[decode] dropping malformed record: {}", e);
                return None;
            }
        };
        if let Some(r) = record.rating {
            if !(MIN_RATING..=MAX_RATING).contains(&r) {
                debug!(
                    "[decode] dropping record item={} with rating {} out of range",
                    record.item_id, r
                );
                return None;
            }
        }
        Some(record)
    }

    /// Decode a batch, dropping the failures.
    pub fn decode_all<I>(values: I) -> Vec<Self>
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        values.into_iter().filter_map(Self::decode).collect()
    }
}

// ── TrendingItem ──────────────────────────────────────────────────────────────

/// What a rail shows for one ranked group. Replaced wholesale on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingItem {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub artwork_url: Option<String>,
    pub log_count: usize,
    pub average_rating: Option<f64>,
    pub item_type: ItemType,
    pub item_id: String,
    pub score: f64,
}

// ── tests ─────────────────────────────────────────────────────────────────────
