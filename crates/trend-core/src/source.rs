//! Data-access contract for activity records.
//!
//! A source answers one question: "give me up to `limit` records matching
//! `filter`, in page order, strictly after `cursor`". Pages carry the cursor
//! for the next call. Malformed documents are dropped by the source and never
//! reach grouping.
//!
//! Page order is newest first; records logged at the same instant are ordered
//! by item and then by author, so an item's tied logs stay on one page where
//! the limit allows it.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use tracing::debug;

use crate::model::{ItemType, LogRecord};

type PageKey<'a> = (Reverse<DateTime<Utc>>, ItemType, &'a str, &'a str);

fn page_key(r: &LogRecord) -> PageKey<'_> {
    (Reverse(r.date_logged), r.item_type, r.item_id.as_str(), r.user_id.as_str())
}

/// Total order used for every page.
pub fn page_order(a: &LogRecord, b: &LogRecord) -> CmpOrdering {
    page_key(a).cmp(&page_key(b))
}

/// Position of the last record handed out. A timestamp alone is not enough:
/// many records can share one `date_logged`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub date_logged: DateTime<Utc>,
    pub item_type: ItemType,
    pub item_id: String,
    pub user_id: String,
}

impl Cursor {
    pub fn of(record: &LogRecord) -> Self {
        Self {
            date_logged: record.date_logged,
            item_type: record.item_type,
            item_id: record.item_id.clone(),
            user_id: record.user_id.clone(),
        }
    }

    fn key(&self) -> PageKey<'_> {
        (Reverse(self.date_logged), self.item_type, self.item_id.as_str(), self.user_id.as_str())
    }

    /// True when `record` comes strictly after this position.
    pub fn is_before(&self, record: &LogRecord) -> bool {
        self.key() < page_key(record)
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

/// The backing store accepts at most this many ids in one author-in-set query.
pub const IN_QUERY_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub item_type: Option<ItemType>,
    /// Array-contains on the record's genres.
    pub genre: Option<String>,
    /// Author-in-set. Callers with more than `IN_QUERY_LIMIT` ids go through
    /// [`fetch_all_authors`].
    pub authors: Option<Vec<String>>,
    /// Date-greater-than on `date_logged`.
    pub since: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(t) = self.item_type {
            if record.item_type != t {
                return false;
            }
        }
        if let Some(g) = &self.genre {
            if !record.has_genre(g) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == record.user_id) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.date_logged <= since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<LogRecord>,
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// Take the first `limit` records matching `filter` after `cursor`.
    pub fn select<'a, I>(records: I, filter: &LogFilter, cursor: Option<&Cursor>, limit: usize) -> Self
    where
        I: IntoIterator<Item = &'a LogRecord>,
    {
        let mut matching: Vec<LogRecord> = records
            .into_iter()
            .filter(|r| filter.matches(r))
            .filter(|r| cursor.map_or(true, |c| c.is_before(r)))
            .cloned()
            .collect();
        matching.sort_by(page_order);
        matching.truncate(limit);
        let next_cursor = matching.last().map(Cursor::of);
        Self {
            records: matching,
            next_cursor,
        }
    }
}

pub trait LogSource: Send + Sync {
    fn fetch(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send;
}

// ── Author-in-set chunking ────────────────────────────────────────────────────

pub fn chunk_authors(authors: &[String]) -> Vec<Vec<String>> {
    authors
        .chunks(IN_QUERY_LIMIT)
        .map(|c| c.to_vec())
        .collect()
}

/// Fetch one page for an arbitrarily large author set.
///
/// Each chunk is queried concurrently with the same cursor. When some chunk
/// filled its page, the merged page is cut at the earliest "last record" (in
/// page order) among the full chunks, so nothing a full chunk has not yet
/// returned is skipped; the cut becomes the next cursor. When no chunk was
/// full the result is final.
pub async fn fetch_all_authors<S: LogSource>(
    source: &S,
    filter: &LogFilter,
    authors: &[String],
    cursor: Option<&Cursor>,
    limit: usize,
) -> Result<Page, SourceError> {
    if authors.is_empty() {
        return Ok(Page::default());
    }

    let chunks = chunk_authors(authors);
    let filters: Vec<LogFilter> = chunks
        .into_iter()
        .map(|chunk| LogFilter {
            authors: Some(chunk),
            ..filter.clone()
        })
        .collect();
    let pages = try_join_all(filters.iter().map(|f| source.fetch(f, cursor, limit))).await?;

    let cut = pages
        .iter()
        .filter(|p| p.records.len() >= limit)
        .filter_map(|p| p.records.last().map(Cursor::of))
        .min();

    let mut records: Vec<LogRecord> = pages.into_iter().flat_map(|p| p.records).collect();
    records.sort_by(page_order);
    if let Some(cut) = &cut {
        records.retain(|r| !cut.is_before(r));
    }
    debug!(
        "[source] author-in-set page: {} records from {} ids, cut={:?}",
        records.len(),
        authors.len(),
        cut
    );

    Ok(Page {
        records,
        next_cursor: cut,
    })
}

// ── In-memory source ──────────────────────────────────────────────────────────

/// Records held in memory. Counts fetches so callers can tell when a
/// "load more" was served without touching the store.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Vec<LogRecord>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self {
            records,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl LogSource for MemorySource {
    async fn fetch(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(Page::select(&self.records, filter, cursor, limit))
    }
}

// ── JSON-lines file source ────────────────────────────────────────────────────

/// One JSON document per line. The file is re-read on every fetch so that an
/// external writer appending to it is picked up on the next refresh.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<Vec<LogRecord>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut dropped = 0usize;
        let records: Vec<LogRecord> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let decoded = serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(LogRecord::decode);
                if decoded.is_none() {
                    dropped += 1;
                }
                decoded
            })
            .collect();
        if dropped > 0 {
            debug!("[source] {}: dropped {} malformed lines", self.path.display(), dropped);
        }
        Ok(records)
    }
}

impl LogSource for JsonLinesSource {
    async fn fetch(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page, SourceError> {
        let records = self.load().await?;
        Ok(Page::select(&records, filter, cursor, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
    }

    fn rec(id: &str, user: &str, minutes_ago: i64) -> LogRecord {
        LogRecord::new(id, ItemType::Song, id, "a", user, t0() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_filter_matches() {
        let mut r = rec("s", "u1", 10);
        r.genres = vec!["jazz".into()];
        let f = LogFilter {
            item_type: Some(ItemType::Song),
            genre: Some("jazz".into()),
            authors: Some(vec!["u1".into()]),
            since: Some(t0() - Duration::hours(1)),
        };
        assert!(f.matches(&r));
        assert!(!LogFilter { genre: Some("rock".into()), ..f.clone() }.matches(&r));
        assert!(!LogFilter { item_type: Some(ItemType::Album), ..f.clone() }.matches(&r));
        assert!(!LogFilter { authors: Some(vec!["u2".into()]), ..f.clone() }.matches(&r));
        assert!(!LogFilter { since: Some(t0()), ..f }.matches(&r));
    }

    #[test]
    fn test_chunk_authors() {
        let ids: Vec<String> = (0..23).map(|i| format!("u{i}")).collect();
        let chunks = chunk_authors(&ids);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 3);
    }

    #[tokio::test]
    async fn test_memory_source_pages_newest_first() {
        let src = MemorySource::new((0..5).map(|i| rec(&format!("s{i}"), "u", i)).collect());
        let first = src.fetch(&LogFilter::default(), None, 2).await.unwrap();
        assert_eq!(first.records[0].item_id, "s0");
        assert_eq!(first.records[1].item_id, "s1");

        let second = src
            .fetch(&LogFilter::default(), first.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(second.records[0].item_id, "s2");
        assert_eq!(src.fetches(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_authors_cuts_at_full_chunk() {
        // 12 authors → two chunks; chunk one (u0..u9) is busy, chunk two is not.
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(rec(&format!("busy{i}"), "u0", i * 10));
        }
        records.push(rec("quiet-new", "u11", 5));
        records.push(rec("quiet-old", "u11", 500));
        let src = MemorySource::new(records);
        let authors: Vec<String> = (0..12).map(|i| format!("u{i}")).collect();

        let page = fetch_all_authors(&src, &LogFilter::default(), &authors, None, 3)
            .await
            .unwrap();
        assert_eq!(src.fetches(), 2);
        // busy chunk stops at 20 minutes ago; the quiet old record waits for a later page
        let ids: Vec<_> = page.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["busy0", "quiet-new", "busy1", "busy2"]);
        assert_eq!(
            page.next_cursor.map(|c| c.date_logged),
            Some(t0() - Duration::minutes(20))
        );
    }

    /// Follow cursors until the source runs dry, returning every record seen.
    async fn drain<F, Fut>(mut fetch: F) -> Vec<LogRecord>
    where
        F: FnMut(Option<Cursor>) -> Fut,
        Fut: Future<Output = Page>,
    {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = fetch(cursor.clone()).await;
            if page.records.is_empty() {
                break;
            }
            seen.extend(page.records);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        seen
    }

    fn identities(records: &[LogRecord]) -> HashSet<(String, String)> {
        records
            .iter()
            .map(|r| (r.item_id.clone(), r.user_id.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_tied_timestamps_are_not_lost_between_pages() {
        let records = vec![
            rec("s2", "u3", 0),
            rec("s1", "u2", 0),
            rec("s0", "u1", 0),
            rec("s1", "u1", 0),
            rec("s0", "u2", 0),
        ];
        let src = MemorySource::new(records.clone());

        let first = src.fetch(&LogFilter::default(), None, 2).await.unwrap();
        let ids: Vec<_> = first.records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["s0", "s0"]);

        let src = &src;
        let seen = drain(move |cursor| {
            async move {
                src.fetch(&LogFilter::default(), cursor.as_ref(), 2)
                    .await
                    .unwrap()
            }
        })
        .await;
        assert_eq!(seen.len(), records.len());
        assert_eq!(identities(&seen), identities(&records));
    }

    #[tokio::test]
    async fn test_fetch_all_authors_keeps_ties_across_chunks() {
        // u0 lands in the first chunk and u10 in the second; everything is tied.
        let records = vec![
            rec("a", "u0", 0),
            rec("b", "u0", 0),
            rec("c", "u0", 0),
            rec("d", "u0", 0),
            rec("a", "u10", 0),
            rec("c", "u10", 0),
        ];
        let src = MemorySource::new(records.clone());
        let authors: Vec<String> = (0..11).map(|i| format!("u{i}")).collect();

        let (src, authors) = (&src, &authors);
        let seen = drain(move |cursor| {
            async move {
                fetch_all_authors(src, &LogFilter::default(), authors, cursor.as_ref(), 2)
                    .await
                    .unwrap()
            }
        })
        .await;
        assert_eq!(seen.len(), records.len());
        assert_eq!(identities(&seen), identities(&records));
    }

    #[test]
    fn test_cursor_orders_ties_by_item_then_author() {
        let at = rec("s1", "u2", 0);
        let cursor = Cursor::of(&at);
        assert!(!cursor.is_before(&at));
        assert!(cursor.is_before(&rec("s1", "u3", 0)));
        assert!(cursor.is_before(&rec("s2", "u0", 0)));
        assert!(cursor.is_before(&rec("s0", "u9", 1)));
        assert!(!cursor.is_before(&rec("s0", "u9", 0)));
    }

    #[tokio::test]
    async fn test_fetch_all_authors_empty_set() {
        let src = MemorySource::new(vec![rec("s", "u", 1)]);
        let page = fetch_all_authors(&src, &LogFilter::default(), &[], None, 10)
            .await
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(src.fetches(), 0);
    }

    #[tokio::test]
    async fn test_json_lines_drops_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.jsonl");
        let good = serde_json::json!({
            "itemId": "s1", "itemType": "song", "title": "t", "artistName": "a",
            "dateLogged": "2024-03-02T11:00:00Z", "userId": "u1",
        });
        std::fs::write(&path, format!("{}\nnot json\n\n{{\"itemId\":1}}\n", good)).unwrap();

        let src = JsonLinesSource::new(path);
        let page = src.fetch(&LogFilter::default(), None, 10).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].item_id, "s1");
    }

    #[tokio::test]
    async fn test_json_lines_missing_file_is_error() {
        let src = JsonLinesSource::new(PathBuf::from("/nonexistent/logs.jsonl"));
        assert!(src.fetch(&LogFilter::default(), None, 10).await.is_err());
    }
}
