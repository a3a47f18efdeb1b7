//! Draft publishing: the post model, HTML rendering and the publisher
//! backends (in-memory, JSON files on disk, WordPress REST).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{PublisherKind, Settings, WordPressSettings};
use crate::feed::Article;
use crate::summarize::text::truncate_words;

pub type PostId = String;

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";
const DIGEST_WORDS: usize = 30;
const CATEGORY_DESCRIPTION: &str = "Articles automatically scraped from RSS feeds";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostMetadata {
    pub source_url: String,
    pub source_feed: String,
    pub source_name: String,
    pub author: String,
    /// Human date ("June 10, 2025"), empty when the feed had none.
    pub publish_date: String,
    pub guid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftPost {
    pub title: String,
    pub html_body: String,
    pub status: String,
    /// Unix seconds of the source article, if known.
    pub published_at: Option<u64>,
    /// Category named after the source feed; digests have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub metadata: PostMetadata,
}

impl DraftPost {
    /// `site_link` is where the attribution points (the feed's site).
    pub fn for_article(
        article: &Article,
        feed_url: &str,
        site_link: &str,
        summary: &str,
        status: &str,
    ) -> Self {
        Self {
            title: article.title.clone(),
            html_body: render_post_html(article, site_link, summary),
            status: status.to_string(),
            published_at: article.published_at,
            category: Some(article.source_name.trim().to_string()).filter(|c| !c.is_empty()),
            metadata: PostMetadata {
                source_url: article.link.clone(),
                source_feed: feed_url.to_string(),
                source_name: article.source_name.clone(),
                author: article
                    .author
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
                publish_date: article.published_at.map(human_date).unwrap_or_default(),
                guid: article.guid.clone(),
            },
        }
    }
}

/// One created article as listed in the run digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_name: String,
    pub published_at: Option<u64>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn create_draft(&self, post: &DraftPost) -> Result<PostId>;
}

/// Backend chosen by `settings.publisher`.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn Publisher>> {
    Ok(match settings.publisher {
        PublisherKind::Memory => Arc::new(MemoryPublisher::new()),
        PublisherKind::File => Arc::new(FilePublisher::open(&settings.drafts_dir)?),
        PublisherKind::Wordpress => {
            let wp = settings
                .wordpress
                .as_ref()
                .context("publisher = \"wordpress\" without a [wordpress] section")?;
            Arc::new(WordPressPublisher::new(wp)?)
        }
    })
}

/// "June 10, 2025" in UTC.
pub fn human_date(unix: u64) -> String {
    i64::try_from(unix)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|dt| dt.format("%B %-d, %Y").to_string())
        .unwrap_or_default()
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn esc_attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// Body of a single article post: summary paragraphs, attribution, link back.
pub fn render_post_html(article: &Article, site_link: &str, summary: &str) -> String {
    let paragraphs: String = summary
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", esc(p)))
        .collect();
    let date = article
        .published_at
        .map(human_date)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "an unknown date".to_string());
    let author = article.author.as_deref().unwrap_or(UNKNOWN_AUTHOR);

    format!(
        concat!(
            "<div class=\"article-summary\">\n{paragraphs}</div>\n",
            "<hr />\n",
            "<div class=\"article-attribution\">\n",
            "<p>This article summary was created from content originally published by ",
            "<a href=\"{site}\" target=\"_blank\" rel=\"nofollow\">{source}</a> on {date}.</p>\n",
            "<p><strong>Author:</strong> {author}</p>\n",
            "<p><strong>Original Article:</strong> ",
            "<a href=\"{link}\" target=\"_blank\" rel=\"nofollow\">Read the full article here</a></p>\n",
            "</div>\n",
            "<div class=\"disclaimer\"><p><em>This is an AI-generated summary for informational purposes. ",
            "Visit the source website for the complete article.</em></p></div>\n"
        ),
        paragraphs = paragraphs,
        site = esc_attr(site_link),
        source = esc(&article.source_name),
        date = esc(&date),
        author = esc(author),
        link = esc_attr(&article.link),
    )
}

pub fn digest_title(now_unix: u64) -> String {
    format!("News Summary - {}", human_date(now_unix))
}

/// Body of the per-run digest post.
pub fn render_digest_html(now_unix: u64, entries: &[DigestEntry]) -> String {
    let mut out = format!("<h2>Daily News Summary - {}</h2>\n", esc(&human_date(now_unix)));
    for e in entries {
        let date = e.published_at.map(human_date).unwrap_or_default();
        out.push_str(&format!(
            concat!(
                "<div class=\"summary-entry\">\n",
                "<h3><a href=\"{link}\" target=\"_blank\" rel=\"nofollow\">{title}</a></h3>\n",
                "<p>{summary}</p>\n",
                "<p class=\"source-info\">Source: {source} | {date}</p>\n",
                "</div>\n"
            ),
            link = esc_attr(&e.link),
            title = esc(&e.title),
            summary = esc(&trim_words_ellipsis(&e.summary, DIGEST_WORDS)),
            source = esc(&e.source_name),
            date = esc(&date),
        ));
    }
    out
}

/// Slug the way WordPress derives one from a plain category name.
pub fn category_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn trim_words_ellipsis(s: &str, n: usize) -> String {
    if s.split_whitespace().count() <= n {
        return s.trim().to_string();
    }
    format!("{}\u{2026}", truncate_words(s, n))
}

// ---------- in-memory ----------

/// Keeps drafts in memory. Can be told to fail, to exercise retry paths.
#[derive(Default)]
pub struct MemoryPublisher {
    posts: Mutex<Vec<(PostId, DraftPost)>>,
    next: AtomicU64,
    failing: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<(PostId, DraftPost)> {
        match self.posts.lock() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.posts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_draft(&self, post: &DraftPost) -> Result<PostId> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory publisher set to fail");
        }
        let id = (self.next.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let mut posts = match self.posts.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        posts.push((id.clone(), post.clone()));
        Ok(id)
    }
}

// ---------- files ----------

/// Writes each draft to `<dir>/<id>.json`.
pub struct FilePublisher {
    dir: PathBuf,
}

impl FilePublisher {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating drafts dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn create_draft(&self, post: &DraftPost) -> Result<PostId> {
        let id = format!(
            "{}-{:08x}",
            Utc::now().format("%Y%m%d%H%M%S"),
            rand::random::<u32>()
        );
        let path = self.dir.join(format!("{id}.json"));
        let json = serde_json::to_vec_pretty(post).context("serializing draft")?;
        let tmp = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&tmp, &json).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("writing draft {}", path.display()));
        }
        Ok(id)
    }
}

// ---------- WordPress ----------

#[derive(Serialize)]
struct WpPost<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_gmt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<u64>,
    meta: &'a PostMetadata,
}

/// `POST {base}/wp-json/wp/v2/posts` with an application password.
/// Categories are looked up by slug and created on first use.
pub struct WordPressPublisher {
    http: reqwest::Client,
    endpoint: String,
    categories_endpoint: String,
    username: String,
    app_password: String,
    category_ids: Mutex<HashMap<String, u64>>,
}

impl WordPressPublisher {
    pub fn new(cfg: &WordPressSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("building wordpress http client")?;
        let api = format!("{}/wp-json/wp/v2", cfg.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            endpoint: format!("{api}/posts"),
            categories_endpoint: format!("{api}/categories"),
            username: cfg.username.clone(),
            app_password: cfg.app_password.clone(),
            category_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn known_categories(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        match self.category_ids.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    async fn category_id(&self, name: &str) -> Result<u64> {
        let slug = category_slug(name);
        if slug.is_empty() {
            bail!("category {name:?} has no usable slug");
        }
        if let Some(id) = self.known_categories().get(&slug).copied() {
            return Ok(id);
        }

        let resp = self
            .http
            .get(&self.categories_endpoint)
            .basic_auth(&self.username, Some(&self.app_password))
            .query(&[("slug", slug.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {}", self.categories_endpoint))?;
        let status = resp.status();
        let text = resp.text().await.context("reading category lookup")?;
        if !status.is_success() {
            bail!("category lookup answered HTTP {}: {}", status.as_u16(), text.trim());
        }
        let found: Value = serde_json::from_str(&text).context("category lookup is not JSON")?;
        let existing = found
            .as_array()
            .and_then(|list| list.first())
            .and_then(|c| c.get("id"))
            .and_then(Value::as_u64);

        let id = match existing {
            Some(id) => id,
            None => self.create_category(name, &slug).await?,
        };
        self.known_categories().insert(slug, id);
        Ok(id)
    }

    async fn create_category(&self, name: &str, slug: &str) -> Result<u64> {
        let resp = self
            .http
            .post(&self.categories_endpoint)
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&serde_json::json!({
                "name": name,
                "slug": slug,
                "description": CATEGORY_DESCRIPTION,
            }))
            .send()
            .await
            .with_context(|| format!("POST {}", self.categories_endpoint))?;
        let status = resp.status();
        let text = resp.text().await.context("reading category response")?;
        let v: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        if status.is_success() {
            return v
                .get("id")
                .and_then(Value::as_u64)
                .context("category response has no id");
        }
        // Created concurrently, or the slug lookup missed a renamed term.
        if v.get("code").and_then(Value::as_str) == Some("term_exists") {
            if let Some(id) = v.pointer("/data/term_id").and_then(Value::as_u64) {
                return Ok(id);
            }
        }
        bail!("creating category answered HTTP {}: {}", status.as_u16(), text.trim())
    }
}

#[async_trait]
impl Publisher for WordPressPublisher {
    fn name(&self) -> &'static str {
        "wordpress"
    }

    async fn create_draft(&self, post: &DraftPost) -> Result<PostId> {
        let date_gmt = post
            .published_at
            .and_then(|s| i64::try_from(s).ok())
            .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        let categories = match post.category.as_deref() {
            Some(name) => match self.category_id(name).await {
                Ok(id) => vec![id],
                Err(e) => {
                    tracing::warn!(error = ?e, category = %name, "posting without category");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let body = WpPost {
            title: &post.title,
            content: &post.html_body,
            status: &post.status,
            date_gmt,
            categories,
            meta: &post.metadata,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = resp.status();
        let text = resp.text().await.context("reading wordpress response")?;
        if !status.is_success() {
            bail!("wordpress answered HTTP {}: {}", status.as_u16(), text.trim());
        }
        let v: Value = serde_json::from_str(&text).context("wordpress response is not JSON")?;
        match v.get("id") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => bail!("wordpress response has no post id"),
        }
    }
}
