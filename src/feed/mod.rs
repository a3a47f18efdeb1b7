// src/feed/mod.rs
pub mod parser;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::cache::{hashed_key, CacheExt, SharedCache, FEED_TTL_SECS};
use crate::logging::EventLog;
use parser::{parse_feed, FeedItem};
pub use transport::{FeedTransport, FetchedBody, FixtureTransport, HttpTransport};

pub const MAX_ITEMS_PER_FEED: usize = 10;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const LOG_SOURCE: &str = "fetcher";

/// One feed item normalized into a common shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    /// Item body with markup removed.
    pub content: String,
    pub link: String,
    /// Unix seconds, when the feed gave a parsable date.
    pub published_at: Option<u64>,
    pub source_name: String,
    /// Stable identity: feed guid/id, else the link.
    pub guid: String,
    pub author: Option<String>,
}

impl Article {
    pub fn from_item(item: FeedItem, source_name: &str) -> Self {
        let guid = item
            .id
            .clone()
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| {
                if item.link.is_empty() {
                    item.title.clone()
                } else {
                    item.link.clone()
                }
            });
        Self {
            title: item.title,
            content: item.content,
            link: item.link,
            published_at: item.published,
            source_name: source_name.to_string(),
            guid,
            author: item.author,
        }
    }
}

/// Unfiltered feed contents as cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub feed_title: String,
    /// Channel permalink; empty when the feed has none.
    #[serde(default)]
    pub site_link: String,
    pub total_items: usize,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedBatch {
    pub feed_title: String,
    /// Where attribution links point: the channel link, else the feed URL.
    pub site_link: String,
    /// Articles considered (after the per-feed cap), before filtering.
    pub considered: usize,
    /// Articles that matched at least one keyword.
    pub articles: Vec<Article>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedProbe {
    pub success: bool,
    pub message: String,
    pub feed_title: Option<String>,
    pub item_count: usize,
}

/// Keep iff any keyword appears (case-insensitive) in title or content.
pub fn matches_keywords(article: &Article, keywords: &[String]) -> bool {
    let title = article.title.to_lowercase();
    let content = article.content.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.trim().to_lowercase();
        !k.is_empty() && (title.contains(&k) || content.contains(&k))
    })
}

pub fn filter_articles(articles: Vec<Article>, keywords: &[String]) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| matches_keywords(a, keywords))
        .collect()
}

pub fn feed_cache_key(url: &str) -> String {
    hashed_key("feed_", url)
}

pub struct FeedFetcher {
    transport: Arc<dyn FeedTransport>,
    cache: SharedCache,
    log: Arc<EventLog>,
    max_items: usize,
    timeout: Duration,
}

impl FeedFetcher {
    pub fn new(transport: Arc<dyn FeedTransport>, cache: SharedCache, log: Arc<EventLog>) -> Self {
        Self {
            transport,
            cache,
            log,
            max_items: MAX_ITEMS_PER_FEED,
            timeout: FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cached or fresh snapshot of `url`, then keyword filter.
    ///
    /// Unreachable feeds are `Err`; non-200, empty and unparsable documents
    /// are logged and produce an empty batch.
    pub async fn fetch_and_filter(&self, url: &str, keywords: &[String]) -> Result<FeedBatch> {
        let (snapshot, from_cache) = self.snapshot(url).await?;
        let considered = snapshot.articles.len();
        let articles = filter_articles(snapshot.articles, keywords);
        self.log.debug(
            LOG_SOURCE,
            format!(
                "{url}: {} of {considered} items matched keywords{}",
                articles.len(),
                if from_cache { " (cached)" } else { "" }
            ),
        );
        let site_link = if snapshot.site_link.is_empty() {
            url.to_string()
        } else {
            snapshot.site_link
        };
        Ok(FeedBatch {
            feed_title: snapshot.feed_title,
            site_link,
            considered,
            articles,
            from_cache,
        })
    }

    async fn snapshot(&self, url: &str) -> Result<(FeedSnapshot, bool)> {
        crate::metrics::describe_all();
        let key = feed_cache_key(url);
        if let Some(hit) = self.cache.get_json::<FeedSnapshot>(&key) {
            counter!("feed_cache_hits_total").increment(1);
            return Ok((hit, true));
        }

        counter!("feed_fetch_total").increment(1);
        let fetched = match self.transport.get(url, self.timeout).await {
            Ok(f) => f,
            Err(e) => {
                counter!("feed_errors_total").increment(1);
                self.log
                    .error(LOG_SOURCE, format!("Failed to load feed {url}: {e:#}"));
                return Err(e);
            }
        };

        if fetched.status != 200 {
            counter!("feed_errors_total").increment(1);
            self.log.warning(
                LOG_SOURCE,
                format!("Feed {url} answered HTTP {}", fetched.status),
            );
            return Ok((empty_snapshot(), false));
        }
        if fetched.body.trim().is_empty() {
            counter!("feed_errors_total").increment(1);
            self.log
                .warning(LOG_SOURCE, format!("Feed {url} returned an empty body"));
            return Ok((empty_snapshot(), false));
        }

        let t0 = Instant::now();
        let parsed = match parse_feed(&fetched.body, self.max_items) {
            Ok(p) => p,
            Err(e) => {
                counter!("feed_errors_total").increment(1);
                self.log
                    .error(LOG_SOURCE, format!("Failed to parse feed {url}: {e:#}"));
                return Ok((empty_snapshot(), false));
            }
        };
        histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("feed_items_total").increment(parsed.items.len() as u64);

        let source_name = if parsed.title.is_empty() {
            url.to_string()
        } else {
            parsed.title.clone()
        };
        let snapshot = FeedSnapshot {
            feed_title: source_name.clone(),
            site_link: parsed.site_link,
            total_items: parsed.total_items,
            articles: parsed
                .items
                .into_iter()
                .map(|it| Article::from_item(it, &source_name))
                .collect(),
        };

        if let Err(e) = self.cache.set_json(&key, &snapshot, FEED_TTL_SECS) {
            tracing::warn!(error = ?e, feed = %url, "caching feed snapshot failed");
        }
        self.log.info(
            LOG_SOURCE,
            format!("Fetched {url}: {} items", snapshot.articles.len()),
        );
        Ok((snapshot, false))
    }

    /// Read-only reachability check. Bypasses (and never writes) the cache.
    pub async fn test_feed(&self, url: &str) -> FeedProbe {
        let fetched = match self.transport.get(url, PROBE_TIMEOUT).await {
            Ok(f) => f,
            Err(e) => {
                return FeedProbe {
                    success: false,
                    message: format!("Error fetching feed: {e:#}"),
                    feed_title: None,
                    item_count: 0,
                }
            }
        };
        if fetched.status != 200 {
            return FeedProbe {
                success: false,
                message: format!("Error fetching feed: HTTP {}", fetched.status),
                feed_title: None,
                item_count: 0,
            };
        }
        match parse_feed(&fetched.body, usize::MAX) {
            Ok(p) => FeedProbe {
                success: true,
                message: format!(
                    "Successfully connected to feed: {} (Found {} items)",
                    p.title, p.total_items
                ),
                feed_title: Some(p.title),
                item_count: p.total_items,
            },
            Err(e) => FeedProbe {
                success: false,
                message: format!("Failed to load RSS feed: {e:#}"),
                feed_title: None,
                item_count: 0,
            },
        }
    }
}

fn empty_snapshot() -> FeedSnapshot {
    FeedSnapshot {
        feed_title: String::new(),
        site_link: String::new(),
        total_items: 0,
        articles: Vec::new(),
    }
}
