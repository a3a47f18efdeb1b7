// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::rate_limit::RateLimit;

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.toml";
pub const ENV_SETTINGS_PATH: &str = "FEED_SUMMARIZER_CONFIG";

pub const MIN_WORD_LIMIT: usize = 100;
pub const MAX_WORD_LIMIT: usize = 700;

fn default_summary_length() -> usize {
    MAX_WORD_LIMIT
}
fn default_schedule_time() -> String {
    "08:00".to_string()
}
fn default_post_status() -> String {
    "draft".to_string()
}
fn default_true() -> bool {
    true
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_drafts_dir() -> PathBuf {
    PathBuf::from("drafts")
}
fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_claude_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    Memory,
    #[default]
    File,
    Wordpress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressSettings {
    pub base_url: String,
    pub username: String,
    /// Application password; "ENV" reads WORDPRESS_APP_PASSWORD.
    pub app_password: String,
}

/// Everything a run reads from the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Newline-separated feed URLs.
    #[serde(default)]
    pub feeds: String,
    /// Comma-separated keywords.
    #[serde(default)]
    pub keywords: String,
    /// "ENV" means: read OPENAI_API_KEY.
    #[serde(default)]
    pub openai_api_key: String,
    /// "ENV" means: read CLAUDE_API_KEY.
    #[serde(default)]
    pub claude_api_key: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_claude_model")]
    pub claude_model: String,
    #[serde(default = "default_summary_length")]
    pub summary_length: usize,
    #[serde(default)]
    pub auto_fetch: bool,
    /// Weekday names ("mon", "tuesday", ...). Empty means every day.
    #[serde(default)]
    pub schedule_days: Vec<String>,
    /// Local time of day, "HH:MM".
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,
    #[serde(default = "default_post_status")]
    pub post_status: String,
    #[serde(default = "default_true")]
    pub create_digest: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: PathBuf,
    #[serde(default)]
    pub publisher: PublisherKind,
    #[serde(default)]
    pub wordpress: Option<WordPressSettings>,
    /// Per-provider overrides of the built-in limits.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimit>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feeds: String::new(),
            keywords: String::new(),
            openai_api_key: String::new(),
            claude_api_key: String::new(),
            openai_model: default_openai_model(),
            claude_model: default_claude_model(),
            summary_length: default_summary_length(),
            auto_fetch: false,
            schedule_days: Vec::new(),
            schedule_time: default_schedule_time(),
            post_status: default_post_status(),
            create_digest: true,
            cache_dir: default_cache_dir(),
            drafts_dir: default_drafts_dir(),
            publisher: PublisherKind::default(),
            wordpress: None,
            rate_limits: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Settings = toml::from_str(s).context("parsing settings toml")?;
        cfg.resolve_env()?;
        Ok(cfg)
    }

    /// Load settings using env var + fallback:
    /// 1) $FEED_SUMMARIZER_CONFIG
    /// 2) config/settings.toml
    /// 3) defaults (nothing configured)
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_SETTINGS_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_SETTINGS_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_SETTINGS_PATH);
        if p.exists() {
            return Self::load_from_file(&p);
        }
        let mut cfg = Settings::default();
        cfg.resolve_env()?;
        Ok(cfg)
    }

    fn resolve_env(&mut self) -> Result<()> {
        self.openai_api_key = resolve_secret(&self.openai_api_key, "OPENAI_API_KEY");
        self.claude_api_key = resolve_secret(&self.claude_api_key, "CLAUDE_API_KEY");
        if let Some(wp) = self.wordpress.as_mut() {
            wp.app_password = resolve_secret(&wp.app_password, "WORDPRESS_APP_PASSWORD");
        }
        if self.publisher == PublisherKind::Wordpress && self.wordpress.is_none() {
            anyhow::bail!("publisher = \"wordpress\" requires a [wordpress] section");
        }
        Ok(())
    }

    /// Feed URLs: one per line, trimmed, blanks removed.
    pub fn feed_urls(&self) -> Vec<String> {
        split_clean(&self.feeds, '\n')
    }

    /// Keywords: comma separated, trimmed, blanks removed.
    pub fn keyword_list(&self) -> Vec<String> {
        split_clean(&self.keywords, ',')
    }

    pub fn word_limit(&self) -> usize {
        clamp_word_limit(self.summary_length)
    }
}

/// Clamp any requested summary length into `[100, 700]`.
pub fn clamp_word_limit(n: usize) -> usize {
    n.clamp(MIN_WORD_LIMIT, MAX_WORD_LIMIT)
}

/// A secret of "ENV" is read from `var`; a missing variable leaves the
/// provider unconfigured instead of failing start-up.
fn resolve_secret(raw: &str, var: &str) -> String {
    if raw.trim().eq_ignore_ascii_case("env") {
        match env::var(var) {
            Ok(v) => v.trim().to_string(),
            Err(_) => {
                tracing::warn!(var, "secret set to ENV but variable is missing");
                String::new()
            }
        }
    } else {
        raw.trim().to_string()
    }
}

fn split_clean(s: &str, sep: char) -> Vec<String> {
    s.split(sep)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
