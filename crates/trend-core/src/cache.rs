//! Short-lived disk cache of ranked lists.
//!
//! One JSON file per rail. Expiry is checked when an entry is read; a periodic
//! `sweep` removes whatever has gone stale. Two writers racing on the same key
//! simply overwrite each other.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::TrendingItem;
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    items: Vec<TrendingItem>,
}

#[derive(Debug, Clone)]
pub struct TrendingCache {
    dir: PathBuf,
    ttl: Duration,
}

impl TrendingCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn is_fresh(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(stored_at);
        match age.to_std() {
            Ok(age) => age <= self.ttl,
            // stored "in the future": clock moved back, treat as fresh
            Err(_) => true,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<TrendingItem>> {
        self.get_at(key, Utc::now()).await
    }

    /// Cached list for `key` if present and younger than the TTL.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<TrendingItem>> {
        let path = self.path_for(key);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                debug!("[cache] unreadable entry {}: {}", path.display(), e);
                return None;
            }
        };
        if !self.is_fresh(entry.stored_at, now) {
            debug!("[cache] {} expired", key);
            return None;
        }
        Some(entry.items)
    }

    pub async fn put(&self, key: &str, items: &[TrendingItem]) -> Result<(), Error> {
        self.put_at(key, items, Utc::now()).await
    }

    pub async fn put_at(
        &self,
        key: &str,
        items: &[TrendingItem],
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let entry = CacheEntry {
            stored_at: now,
            items: items.to_vec(),
        };
        let content = serde_json::to_string(&entry)?;
        tokio::fs::write(self.path_for(key), content).await?;
        Ok(())
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Delete expired or unreadable entries. Best effort; returns how many
    /// files were removed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(_) => return 0,
        };
        let mut removed = 0;
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => {
                    warn!("[cache] sweep stopped: {}", e);
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<CacheEntry>(&content) {
                    Ok(e) => !self.is_fresh(e.stored_at, now),
                    Err(_) => true,
                },
                Err(_) => continue,
            };
            if stale {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("[cache] failed to remove {}: {}", path.display(), e),
                }
            }
        }
        if removed > 0 {
            debug!("[cache] sweep removed {} entries", removed);
        }
        removed
    }
}

/// Map a rail key onto a safe file name.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
