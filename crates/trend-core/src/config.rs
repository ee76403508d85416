use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::platform;
use crate::pipeline::RailSpec;
use crate::score::Weights;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default = "default_rails")]
    pub rails: Vec<RailSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    File,
    Http,
}

/// Where activity records come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// JSON-lines file, used when `kind = "file"`.
    #[serde(default = "default_logs_path")]
    pub path: PathBuf,
    /// Remote endpoint, used when `kind = "http"`.
    #[serde(default = "default_source_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// The viewer the rails are computed for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    /// Hidden or blocked authors.
    #[serde(default)]
    pub hidden_users: Vec<String>,
}

impl ViewerConfig {
    pub fn hidden_set(&self) -> HashSet<String> {
        self.hidden_users.iter().cloned().collect()
    }

    pub fn mutuals(&self) -> HashSet<String> {
        let following: HashSet<String> = self.following.iter().cloned().collect();
        let followers: HashSet<String> = self.followers.iter().cloned().collect();
        crate::pipeline::mutuals(&following, &followers)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: default_logs_path(),
            url: default_source_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: default_cache_dir(),
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_logs_path() -> PathBuf {
    platform::data_dir().join("logs.jsonl")
}

fn default_source_url() -> String {
    "http://127.0.0.1:8080/api/logs".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    platform::cache_dir().join("rails")
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_rails() -> Vec<RailSpec> {
    vec![
        RailSpec::songs(),
        RailSpec::albums(),
        RailSpec::artists(),
        RailSpec::combined(),
        RailSpec::friends(),
        RailSpec::weekly(),
    ]
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rail in &self.rails {
            if rail.name.trim().is_empty() {
                return Err(Error::Config("rail with empty name".into()));
            }
            if !seen.insert(rail.name.as_str()) {
                return Err(Error::Config(format!("duplicate rail '{}'", rail.name)));
            }
            if rail.page_size == 0 || rail.display_step == 0 {
                return Err(Error::Config(format!(
                    "rail '{}': page_size and display_step must be positive",
                    rail.name
                )));
            }
        }
        Ok(())
    }

    pub fn rail(&self, name: &str) -> Option<&RailSpec> {
        self.rails.iter().find(|r| r.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            source: SourceConfig::default(),
            cache: CacheConfig::default(),
            viewer: ViewerConfig::default(),
            weights: Weights::default(),
            rails: default_rails(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::KeyStrategy;
    use crate::score::ScoreKind;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8787);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.source.kind, SourceKind::File);
        assert!(config.source.path.ends_with("logs.jsonl"));
        assert_eq!(config.rails.len(), 6);
        assert_eq!(config.weights.trending.count, 3.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [viewer]
            user_id = "me"
            following = ["a", "b"]
            followers = ["b", "c"]
            hidden_users = ["spam"]

            [weights.friends]
            helpful = 5.0
            comments = 1.0
            likes = 1.0
            rating = 0.5
            unhelpful_penalty = 3.0

            [[rails]]
            name = "jazz"
            genre = "jazz"
            key = "composite"

            [[rails]]
            name = "friends"
            audience = "mutuals"
            score = "friends"
            window = { hours = 72 }
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.http.port, 8787);
        assert_eq!(config.viewer.mutuals().len(), 1);
        assert!(config.viewer.hidden_set().contains("spam"));
        assert_eq!(config.weights.friends.helpful, 5.0);
        assert_eq!(config.weights.trending.count, 3.0);

        let jazz = config.rail("jazz").unwrap();
        assert_eq!(jazz.key, KeyStrategy::Composite);
        assert_eq!(jazz.page_size, crate::pipeline::DEFAULT_PAGE_SIZE);
        let friends = config.rail("friends").unwrap();
        assert_eq!(friends.score, ScoreKind::Friends);
        assert_eq!(friends.window.hours, 72);
    }

    #[test]
    fn test_duplicate_rails_rejected() {
        let mut config = Config::default();
        config.rails.push(RailSpec::songs());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.viewer.user_id = "viewer-1".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.viewer.user_id, "viewer-1");
        assert_eq!(loaded.rails.len(), config.rails.len());
    }
}
