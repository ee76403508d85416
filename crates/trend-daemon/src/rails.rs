//! The daemon's set of rails and their published views.
//!
//! Each rail has its own controller behind a mutex and a separately published
//! `RailView`. Readers only ever touch the view, so a slow fetch on one rail
//! never blocks reads, and a second refresh of a busy rail is answered with
//! the current view instead of queueing.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use trend_core::cache::TrendingCache;
use trend_core::config::Config;
use trend_core::source::LogSource;
use trend_core::{LoadState, RailController, TrendingItem};

#[derive(Debug, Clone, Serialize)]
pub struct RailView {
    pub name: String,
    pub state: &'static str,
    pub error: Option<String>,
    pub exhausted: bool,
    pub items: Vec<TrendingItem>,
}

impl RailView {
    fn capture<S: LogSource>(c: &RailController<S>) -> Self {
        let error = match c.state() {
            LoadState::Failed(e) => Some(e.clone()),
            _ => None,
        };
        Self {
            name: c.name().to_string(),
            state: c.state().label(),
            error,
            exhausted: c.is_exhausted(),
            items: c.items(),
        }
    }
}

pub enum Outcome {
    Done(RailView),
    /// Another request is already loading this rail.
    Busy(RailView),
}

struct Rail<S> {
    controller: Mutex<RailController<S>>,
    view: RwLock<RailView>,
}

pub struct RailRegistry<S> {
    rails: HashMap<String, Arc<Rail<S>>>,
    order: Vec<String>,
    cache: Option<TrendingCache>,
}

impl<S: LogSource + 'static> RailRegistry<S> {
    pub fn new(source: Arc<S>, config: &Config, cache: Option<TrendingCache>) -> Self {
        let hidden = config.viewer.hidden_set();
        let mutuals = config.viewer.mutuals();

        let mut rails = HashMap::new();
        let mut order = Vec::new();
        for spec in &config.rails {
            let mut controller = RailController::new(source.clone(), spec.clone(), config.weights);
            controller.set_hidden_users(hidden.clone());
            controller.set_mutuals(mutuals.clone());
            let view = RailView::capture(&controller);
            order.push(spec.name.clone());
            rails.insert(
                spec.name.clone(),
                Arc::new(Rail {
                    controller: Mutex::new(controller),
                    view: RwLock::new(view),
                }),
            );
        }

        Self { rails, order, cache }
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub async fn view(&self, name: &str) -> Option<RailView> {
        let rail = self.rails.get(name)?;
        let view = rail.view.read().await.clone();
        Some(view)
    }

    pub async fn views(&self) -> Vec<RailView> {
        let mut out = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(v) = self.view(name).await {
                out.push(v);
            }
        }
        out
    }

    /// Show cached lists until the first refresh lands.
    pub async fn seed_from_cache(&self) {
        let Some(cache) = &self.cache else { return };
        for (name, rail) in &self.rails {
            if let Some(items) = cache.get(name).await {
                info!("[{}] seeded {} items from cache", name, items.len());
                let mut c = rail.controller.lock().await;
                c.seed(items);
                *rail.view.write().await = RailView::capture(&c);
            }
        }
    }

    pub async fn refresh(&self, name: &str) -> Option<Outcome> {
        let rail = self.rails.get(name)?;
        let Ok(mut c) = rail.controller.try_lock() else {
            return Some(Outcome::Busy(rail.view.read().await.clone()));
        };
        c.refresh().await;
        let view = RailView::capture(&c);
        drop(c);
        self.publish(rail, &view).await;
        Some(Outcome::Done(view))
    }

    pub async fn load_more(&self, name: &str) -> Option<Outcome> {
        let rail = self.rails.get(name)?;
        let Ok(mut c) = rail.controller.try_lock() else {
            return Some(Outcome::Busy(rail.view.read().await.clone()));
        };
        c.load_more().await;
        let view = RailView::capture(&c);
        drop(c);
        self.publish(rail, &view).await;
        Some(Outcome::Done(view))
    }

    /// Refresh every rail concurrently; each rail's pipeline stays sequential.
    pub async fn refresh_all(&self) {
        join_all(self.order.iter().map(|name| self.refresh(name))).await;
    }

    async fn publish(&self, rail: &Rail<S>, view: &RailView) {
        *rail.view.write().await = view.clone();
        if view.state != "loaded" {
            return;
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&view.name, &view.items).await {
                warn!("[{}] cache write failed: {}", view.name, e);
            }
        }
    }

    pub fn cache(&self) -> Option<&TrendingCache> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use trend_core::source::MemorySource;
    use trend_core::{ItemType, LogRecord, RailSpec};

    fn config() -> Config {
        let mut config = Config::default();
        config.rails = vec![RailSpec::songs(), RailSpec::albums()];
        config.viewer.hidden_users = vec!["spammer".into()];
        config
    }

    fn records() -> Vec<LogRecord> {
        let at = Utc::now() - Duration::minutes(10);
        vec![
            LogRecord::new("s1", ItemType::Song, "One", "A", "u1", at).with_rating(5),
            LogRecord::new("s1", ItemType::Song, "One", "A", "u2", at).with_rating(4),
            LogRecord::new("s2", ItemType::Song, "Two", "B", "spammer", at),
            LogRecord::new("s2", ItemType::Song, "Two", "B", "spammer", at),
        ]
    }

    #[tokio::test]
    async fn test_refresh_publishes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TrendingCache::new(dir.path().to_path_buf(), std::time::Duration::from_secs(60));
        let registry = RailRegistry::new(
            Arc::new(MemorySource::new(records())),
            &config(),
            Some(cache.clone()),
        );

        assert_eq!(registry.view("songs").await.unwrap().state, "idle");
        registry.refresh_all().await;

        let songs = registry.view("songs").await.unwrap();
        assert_eq!(songs.state, "loaded");
        assert_eq!(songs.items.len(), 1);
        assert_eq!(songs.items[0].id, "s1");
        assert!(registry.view("albums").await.unwrap().items.is_empty());
        assert_eq!(cache.get("songs").await.unwrap().len(), 1);
        assert!(registry.view("nope").await.is_none());
        assert!(registry.refresh("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_seed_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TrendingCache::new(dir.path().to_path_buf(), std::time::Duration::from_secs(60));
        let warm = RailRegistry::new(Arc::new(MemorySource::new(records())), &config(), Some(cache.clone()));
        warm.refresh_all().await;

        let cold = RailRegistry::new(Arc::new(MemorySource::new(vec![])), &config(), Some(cache));
        cold.seed_from_cache().await;
        let songs = cold.view("songs").await.unwrap();
        assert_eq!(songs.state, "idle");
        assert_eq!(songs.items.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_rail_answers_with_current_view() {
        let registry = RailRegistry::new(Arc::new(MemorySource::new(records())), &config(), None);
        let rail = registry.rails.get("songs").unwrap().clone();
        let _held = rail.controller.lock().await;
        match registry.refresh("songs").await.unwrap() {
            Outcome::Busy(view) => assert_eq!(view.state, "idle"),
            Outcome::Done(_) => panic!("expected busy"),
        }
    }
}
