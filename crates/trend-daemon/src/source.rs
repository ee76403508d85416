//! Record sources the daemon can be pointed at.
//!
//! `file` re-reads a JSON-lines export on every fetch. `http` queries a remote
//! endpoint that answers with a JSON array of log documents (or an object
//! holding one under `records`). Documents that fail to decode are dropped.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use trend_core::config::{SourceConfig, SourceKind};
use trend_core::source::{Cursor, JsonLinesSource, LogFilter, LogSource, Page, SourceError};
use trend_core::LogRecord;

pub enum DaemonSource {
    File(JsonLinesSource),
    Http(HttpSource),
}

impl DaemonSource {
    pub fn from_config(config: &SourceConfig) -> anyhow::Result<Self> {
        Ok(match config.kind {
            SourceKind::File => Self::File(JsonLinesSource::new(config.path.clone())),
            SourceKind::Http => Self::Http(HttpSource::new(
                config.url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::File(s) => format!("file {}", s.path().display()),
            Self::Http(s) => format!("http {}", s.url),
        }
    }
}

impl LogSource for DaemonSource {
    async fn fetch(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page, SourceError> {
        match self {
            Self::File(s) => s.fetch(filter, cursor, limit).await,
            Self::Http(s) => s.fetch(filter, cursor, limit).await,
        }
    }
}

// ── HTTP source ───────────────────────────────────────────────────────────────

pub struct HttpSource {
    url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("trend-daemon/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { url, client })
    }
}

/// Query parameters understood by the remote log endpoint. The cursor is
/// sent whole; the endpoint resumes after `(before, beforeType, beforeItem,
/// beforeUser)` in newest-first order.
pub fn query_params(
    filter: &LogFilter,
    cursor: Option<&Cursor>,
    limit: usize,
) -> Vec<(&'static str, String)> {
    let mut q = vec![("limit", limit.to_string())];
    if let Some(t) = filter.item_type {
        q.push(("itemType", t.label().to_string()));
    }
    if let Some(g) = &filter.genre {
        q.push(("genre", g.clone()));
    }
    if let Some(authors) = &filter.authors {
        q.push(("authors", authors.join(",")));
    }
    if let Some(since) = filter.since {
        q.push(("since", since.to_rfc3339()));
    }
    if let Some(c) = cursor {
        q.push(("before", c.date_logged.to_rfc3339()));
        q.push(("beforeType", c.item_type.label().to_string()));
        q.push(("beforeItem", c.item_id.clone()));
        q.push(("beforeUser", c.user_id.clone()));
    }
    q
}

/// Decode a response body. Accepts a bare array or `{ "records": [...] }`.
pub fn parse_records(body: Value) -> Result<Vec<LogRecord>, SourceError> {
    let docs = match body {
        Value::Array(docs) => docs,
        Value::Object(mut obj) => match obj.remove("records") {
            Some(Value::Array(docs)) => docs,
            _ => return Err(SourceError::Response("missing 'records' array".into())),
        },
        other => {
            return Err(SourceError::Response(format!(
                "expected array, got {}",
                type_name(&other)
            )))
        }
    };
    let total = docs.len();
    let records = LogRecord::decode_all(docs);
    if records.len() < total {
        debug!("[http-source] dropped {} malformed documents", total - records.len());
    }
    Ok(records)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null      => "null",
        Value::Bool(_)   => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

impl LogSource for HttpSource {
    async fn fetch(
        &self,
        filter: &LogFilter,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page, SourceError> {
        let body: Value = self
            .client
            .get(&self.url)
            .query(&query_params(filter, cursor, limit))
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| SourceError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| SourceError::Response(e.to_string()))?;

        let records = parse_records(body)?;
        // the endpoint is trusted for ordering and limit, but the filter is
        // re-applied in case it ignores a parameter
        Ok(Page::select(&records, filter, cursor, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use trend_core::ItemType;

    #[test]
    fn test_query_params() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let filter = LogFilter {
            item_type: Some(ItemType::Album),
            genre: Some("jazz".into()),
            authors: Some(vec!["a".into(), "b".into()]),
            since: Some(since),
        };
        let last = LogRecord::new("al-9", ItemType::Album, "t", "x", "b", since);
        let q = query_params(&filter, Some(&Cursor::of(&last)), 100);
        assert!(q.contains(&("limit", "100".to_string())));
        assert!(q.contains(&("itemType", "album".to_string())));
        assert!(q.contains(&("authors", "a,b".to_string())));
        assert!(q.contains(&("since", "2024-03-01T12:00:00+00:00".to_string())));
        assert!(q.contains(&("before", "2024-03-01T12:00:00+00:00".to_string())));
        assert!(q.contains(&("beforeType", "album".to_string())));
        assert!(q.contains(&("beforeItem", "al-9".to_string())));
        assert!(q.contains(&("beforeUser", "b".to_string())));

        let bare = query_params(&LogFilter::default(), None, 5);
        assert_eq!(bare, vec![("limit", "5".to_string())]);
    }

    #[test]
    fn test_parse_records_shapes() {
        let doc = json!({
            "itemId": "s1", "itemType": "song", "title": "t", "artistName": "a",
            "dateLogged": "2024-03-01T12:00:00Z", "userId": "u1",
        });
        let arr = parse_records(json!([doc.clone(), { "bad": 1 }])).unwrap();
        assert_eq!(arr.len(), 1);

        let wrapped = parse_records(json!({ "records": [doc] })).unwrap();
        assert_eq!(wrapped[0].item_id, "s1");

        assert!(parse_records(json!({ "data": [] })).is_err());
        assert!(parse_records(json!("nope")).is_err());
    }
}
