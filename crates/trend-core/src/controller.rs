//! Per-rail orchestration: fetch → filter → group → score → sort → page.
//!
//! ## Refresh
//!
//! Throws away the accumulated ranking, fetches the first page of the rail's
//! window (wider windows are tried if the policy asks for it) and replaces the
//! displayed list wholesale.
//!
//! ## Load more
//!
//! Raises the visible count. Only when every ranked item is already visible
//! does it fetch the next page, merge it into the ranking by key and re-rank.
//! A rail is exhausted once a page comes back short or the cursor stops
//! moving.
//!
//! ## Failures
//!
//! Fetch errors never escape. The slice goes to `Failed`, a warning is
//! logged, and the previous items stay on display until the next manual
//! refresh. There is no retry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::model::{LogRecord, TrendingItem};
use crate::paginate::{DisplayWindow, PagingMode, RankedSet};
use crate::pipeline::{fallback_trending, rank_page, Audience, RailSpec};
use crate::score::Weights;
use crate::slice::{LoadState, Slice};
use crate::source::{fetch_all_authors, Cursor, LogSource, Page, SourceError};
use crate::window::start_for;

pub struct RailController<S> {
    source: Arc<S>,
    spec: RailSpec,
    weights: Weights,
    hidden: HashSet<String>,
    audience_ids: Vec<String>,
    ranked: RankedSet,
    display: DisplayWindow,
    since: Option<DateTime<Utc>>,
    cursor: Option<Cursor>,
    exhausted: bool,
    slice: Slice<Vec<TrendingItem>>,
}

impl<S: LogSource> RailController<S> {
    pub fn new(source: Arc<S>, spec: RailSpec, weights: Weights) -> Self {
        let display = DisplayWindow::new(spec.display_step.max(1));
        Self {
            source,
            spec,
            weights,
            hidden: HashSet::new(),
            audience_ids: Vec::new(),
            ranked: RankedSet::new(),
            display,
            since: None,
            cursor: None,
            exhausted: false,
            slice: Slice::new(),
        }
    }

    pub fn spec(&self) -> &RailSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> &LoadState<Vec<TrendingItem>> {
        self.slice.state()
    }

    pub fn is_loading(&self) -> bool {
        self.slice.is_loading()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn ranked_len(&self) -> usize {
        self.ranked.len()
    }

    /// Items currently on display (last good list after a failure).
    pub fn items(&self) -> Vec<TrendingItem> {
        self.slice.data().cloned().unwrap_or_default()
    }

    /// Authors whose records must never surface. Owned by the caller.
    pub fn set_hidden_users(&mut self, hidden: HashSet<String>) {
        self.hidden = hidden;
    }

    /// Viewer's mutual follows, used by `Audience::Mutuals` rails.
    pub fn set_mutuals(&mut self, mutuals: HashSet<String>) {
        let mut ids: Vec<String> = mutuals.into_iter().collect();
        ids.sort();
        self.audience_ids = ids;
    }

    /// Show `items` until the first refresh lands.
    pub fn seed(&mut self, items: Vec<TrendingItem>) {
        if self.slice.data().is_none() {
            self.slice = Slice::seeded(items);
        }
    }

    pub async fn refresh(&mut self) {
        self.refresh_at(Utc::now()).await
    }

    pub async fn load_more(&mut self) {
        self.load_more_at(Utc::now()).await
    }

    pub async fn refresh_at(&mut self, now: DateTime<Utc>) {
        if !self.slice.begin() {
            debug!("[{}] refresh ignored, already loading", self.spec.name);
            return;
        }

        let result = match self.spec.paging {
            PagingMode::Rerank   => self.fetch_first(now).await,
            PagingMode::Snapshot => self.fetch_snapshot(now).await,
        };

        match result {
            Ok((since, records, cursor, exhausted)) => {
                let groups = rank_page(records, &self.hidden, &self.spec, &self.weights, now);
                self.ranked.clear();
                self.ranked.merge(groups);
                self.display.reset();
                self.since = Some(since);
                self.cursor = cursor;
                self.exhausted = exhausted;
                info!(
                    "[{}] refreshed: {} ranked, exhausted={}",
                    self.spec.name,
                    self.ranked.len(),
                    self.exhausted
                );
                self.publish();
            }
            Err(e) => {
                warn!("[{}] refresh failed: {}", self.spec.name, e);
                self.slice.fail(e.to_string());
            }
        }
    }

    pub async fn load_more_at(&mut self, now: DateTime<Utc>) {
        if self.slice.is_loading() {
            debug!("[{}] load more ignored, already loading", self.spec.name);
            return;
        }
        let Some(since) = self.since else {
            // never refreshed successfully; nothing to page from
            return;
        };

        if self.display.has_hidden(self.ranked.len()) {
            self.display.grow();
            self.publish();
            return;
        }
        if self.exhausted || self.spec.paging == PagingMode::Snapshot {
            return;
        }

        self.slice.begin();
        match self.fetch_page(since, self.cursor.as_ref()).await {
            Ok(page) => {
                let (records, cursor, exhausted) = self.advance(page);
                let groups = rank_page(records, &self.hidden, &self.spec, &self.weights, now);
                let before = self.ranked.len();
                self.ranked.merge(groups);
                self.cursor = cursor;
                self.exhausted = exhausted;
                self.display.grow();
                debug!(
                    "[{}] page merged: {} → {} ranked, exhausted={}",
                    self.spec.name,
                    before,
                    self.ranked.len(),
                    self.exhausted
                );
                self.publish();
            }
            Err(e) => {
                warn!("[{}] load more failed: {}", self.spec.name, e);
                self.slice.fail(e.to_string());
            }
        }
    }

    fn publish(&mut self) {
        let items = if self.ranked.is_empty() {
            fallback_trending(&self.spec)
        } else {
            self.ranked.items(self.spec.key, self.display.visible)
        };
        self.slice.finish(items);
    }

    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, SourceError> {
        let filter = self.spec.filter(since);
        match self.spec.audience {
            Audience::Global => {
                self.source
                    .fetch(&filter, cursor, self.spec.page_size)
                    .await
            }
            Audience::Mutuals => {
                fetch_all_authors(
                    self.source.as_ref(),
                    &filter,
                    &self.audience_ids,
                    cursor,
                    self.spec.page_size,
                )
                .await
            }
        }
    }

    /// Split a page into its records, the next cursor and whether the rail
    /// ran dry.
    fn advance(&self, page: Page) -> (Vec<LogRecord>, Option<Cursor>, bool) {
        let exhausted = page.records.len() < self.spec.page_size
            || page.next_cursor.is_none()
            || page.next_cursor == self.cursor;
        (page.records, page.next_cursor, exhausted)
    }

    async fn fetch_first(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, Vec<LogRecord>, Option<Cursor>, bool), SourceError> {
        let mut hours = self.spec.window.hours;
        loop {
            let since = start_for(now, hours);
            let page = self.fetch_page(since, None).await?;
            if let Some(wider) = self.spec.window.widen(hours, page.records.len()) {
                debug!(
                    "[{}] only {} records in {}h, widening to {}h",
                    self.spec.name,
                    page.records.len(),
                    hours,
                    wider
                );
                hours = wider;
                continue;
            }
            let exhausted = page.records.len() < self.spec.page_size || page.next_cursor.is_none();
            return Ok((since, page.records, page.next_cursor, exhausted));
        }
    }

    async fn fetch_snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, Vec<LogRecord>, Option<Cursor>, bool), SourceError> {
        let (since, mut records, mut cursor, mut exhausted) = self.fetch_first(now).await?;
        let mut pages = 1;
        while !exhausted && pages < self.spec.snapshot_pages {
            let page = self.fetch_page(since, cursor.as_ref()).await?;
            let short = page.records.len() < self.spec.page_size;
            let stalled = page.next_cursor.is_none() || page.next_cursor == cursor;
            records.extend(page.records);
            cursor = page.next_cursor;
            exhausted = short || stalled;
            pages += 1;
        }
        // the ranking is fixed from here on
        Ok((since, records, cursor, true))
    }
}
