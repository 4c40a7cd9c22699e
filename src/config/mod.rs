// src/config/mod.rs
//! Layered ingest configuration: defaults, then an optional TOML file, then
//! environment variables. CLI flags are applied on top by the binary.

pub mod ai;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::MAX_ITEMS;
use ai::AiConfig;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";
pub const DEFAULT_FEED_URL: &str =
    "https://news.google.com/rss/search?q=%E5%BA%9C%E4%B8%AD%E5%B8%82&hl=ja&gl=JP&ceid=JP:ja";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub feed_url: String,
    pub store_path: PathBuf,
    pub max_items: usize,
    /// Extra fetch attempts after the first failure.
    pub fetch_retries: u8,
    pub fetch_backoff_ms: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub ai: AiConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            store_path: PathBuf::from("public/news.json"),
            max_items: MAX_ITEMS,
            fetch_retries: 2,
            fetch_backoff_ms: 500,
            fetch_timeout_secs: 15,
            user_agent: concat!("fuchupo-news/", env!("CARGO_PKG_VERSION")).to_string(),
            ai: AiConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load from an explicit TOML file (missing keys take defaults).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing ingest config {}", path.display()))
    }

    /// Resolve the config file, then overlay the process environment:
    /// 1) `explicit` (e.g. `--config`)
    /// 2) $INGEST_CONFIG_PATH
    /// 3) config/ingest.toml
    /// 4) built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(p) => Self::load_from(p)?,
            None => Self::load_file_default()?,
        };
        cfg.apply_env_with(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    fn load_file_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default())
    }

    /// Overlay environment variables looked up through `get`.
    pub fn apply_env_with<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // RSS_FEEDS may be a comma list; one endpoint per run, so take the first.
        let feed = get("RSS_FEED_URL").or_else(|| {
            get("RSS_FEEDS").and_then(|v| v.split(',').next().map(|s| s.to_string()))
        });
        if let Some(url) = feed.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.feed_url = url;
        }
        if let Some(p) = get("NEWS_STORE_PATH").filter(|p| !p.trim().is_empty()) {
            self.store_path = PathBuf::from(p.trim());
        }
        if let Some(n) = get("NEWS_MAX_ITEMS").and_then(|v| v.trim().parse().ok()) {
            self.max_items = n;
        }
        if let Some(n) = get("FETCH_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.fetch_retries = n;
        }
        self.ai.apply_env_with(get);
    }

    /// Clamp numeric knobs: `max_items` to `1..=MAX_ITEMS`, timeouts >= 1s.
    pub fn sanitize(&mut self) {
        self.max_items = self.max_items.clamp(1, MAX_ITEMS);
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = 15;
        }
        self.ai.sanitize();
    }
}
