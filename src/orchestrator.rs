// src/orchestrator.rs
//! One run: feeds → keyword filter → summarize → draft posts → digest.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::cache::{hashed_key, FileCache, SharedCache, PROCESSED_TTL_SECS};
use crate::clock::SharedClock;
use crate::config::{self, SettingsHandle};
use crate::feed::{Article, FeedFetcher, FeedProbe, FeedTransport, HttpTransport};
use crate::logging::EventLog;
use crate::publish::{self, digest_title, render_digest_html, DigestEntry, DraftPost, PostId, Publisher};
use crate::rate_limit::RateLimiter;
use crate::summarize::text::plain_excerpt;
use crate::summarize::Summarizer;

const LOG_SOURCE: &str = "orchestrator";

/// The only expected run-level failure; everything else is logged per unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    MissingConfig(&'static str),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::MissingConfig(what) => write!(f, "missing configuration: {what}"),
        }
    }
}

impl std::error::Error for RunError {}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub feeds: usize,
    pub feeds_failed: usize,
    pub matched: usize,
    pub created: usize,
    /// Already processed in an earlier run.
    pub skipped: usize,
    /// Publish failures; retried next run.
    pub failed: usize,
    pub posts: Vec<PostId>,
    pub digest_post: Option<PostId>,
}

pub fn processed_key(guid: &str) -> String {
    hashed_key("processed_", guid)
}

pub struct Orchestrator {
    settings: SettingsHandle,
    fetcher: FeedFetcher,
    summarizer: Summarizer,
    cache: SharedCache,
    publisher: Arc<dyn Publisher>,
    log: Arc<EventLog>,
    clock: SharedClock,
}

impl Orchestrator {
    pub fn new(
        settings: SettingsHandle,
        fetcher: FeedFetcher,
        summarizer: Summarizer,
        cache: SharedCache,
        publisher: Arc<dyn Publisher>,
        log: Arc<EventLog>,
        clock: SharedClock,
    ) -> Self {
        Self {
            settings,
            fetcher,
            summarizer,
            cache,
            publisher,
            log,
            clock,
        }
    }

    /// Production wiring: file cache, HTTP feeds, providers and publisher
    /// from the current settings.
    pub fn from_settings(
        settings: SettingsHandle,
        clock: SharedClock,
        log: Arc<EventLog>,
    ) -> Result<Self> {
        let s = config::snapshot(&settings);

        let cache: SharedCache = Arc::new(
            FileCache::open(&s.cache_dir, clock.clone())
                .with_context(|| format!("opening cache dir {}", s.cache_dir.display()))?,
        );
        let transport: Arc<dyn FeedTransport> = Arc::new(HttpTransport::new()?);

        let mut limiter = RateLimiter::with_defaults(clock.clone());
        for (name, limit) in &s.rate_limits {
            limiter = limiter.with_limit(name, *limit);
        }
        let summarizer = Summarizer::from_settings(&s, Arc::new(limiter), cache.clone(), log.clone())?;
        let publisher = publish::from_settings(&s)?;
        let fetcher = FeedFetcher::new(transport, cache.clone(), log.clone());

        tracing::info!(
            publisher = publisher.name(),
            cache_dir = %s.cache_dir.display(),
            providers = ?summarizer.provider_names(),
            "orchestrator ready"
        );
        Ok(Self::new(settings, fetcher, summarizer, cache, publisher, log, clock))
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn is_processed(&self, guid: &str) -> bool {
        self.cache.get(&processed_key(guid)).is_some()
    }

    pub async fn test_feed(&self, url: &str) -> FeedProbe {
        self.fetcher.test_feed(url).await
    }

    pub async fn run_cycle(&self) -> Result<RunReport, RunError> {
        crate::metrics::describe_all();
        let s = config::snapshot(&self.settings);
        let feeds = s.feed_urls();
        let keywords = s.keyword_list();
        if feeds.is_empty() || keywords.is_empty() {
            let what = if feeds.is_empty() { "feeds" } else { "keywords" };
            self.log.warning(
                LOG_SOURCE,
                format!("Run skipped - missing {what} in settings"),
            );
            return Err(RunError::MissingConfig(what));
        }

        let limit = s.word_limit();
        let mut report = RunReport {
            feeds: feeds.len(),
            ..RunReport::default()
        };
        let mut digest = Vec::new();

        for url in &feeds {
            let batch = match self.fetcher.fetch_and_filter(url, &keywords).await {
                Ok(b) => b,
                Err(e) => {
                    report.feeds_failed += 1;
                    tracing::warn!(error = ?e, feed = %url, "feed skipped");
                    continue;
                }
            };
            report.matched += batch.articles.len();

            for article in &batch.articles {
                if self.is_processed(&article.guid) {
                    report.skipped += 1;
                    counter!("posts_skipped_total").increment(1);
                    continue;
                }
                let summary = self.summary_for(article, limit).await;
                let post = DraftPost::for_article(
                    article,
                    url,
                    &batch.site_link,
                    &summary,
                    &s.post_status,
                );

                match self.publisher.create_draft(&post).await {
                    Ok(id) => {
                        if let Err(e) =
                            self.cache
                                .set(&processed_key(&article.guid), &id, PROCESSED_TTL_SECS)
                        {
                            tracing::warn!(error = ?e, guid = %article.guid, "marking article processed failed");
                        }
                        counter!("posts_created_total").increment(1);
                        report.created += 1;
                        report.posts.push(id);
                        digest.push(DigestEntry {
                            title: article.title.clone(),
                            link: article.link.clone(),
                            summary,
                            source_name: article.source_name.clone(),
                            published_at: article.published_at,
                        });
                    }
                    Err(e) => {
                        counter!("publish_errors_total").increment(1);
                        report.failed += 1;
                        self.log.error(
                            LOG_SOURCE,
                            format!("Failed to create post for article: {}: {e:#}", article.title),
                        );
                    }
                }
            }
        }

        let now = self.clock.now_unix();
        if s.create_digest && !digest.is_empty() {
            report.digest_post = self.publish_digest(now, &digest, &s.post_status).await;
        }

        counter!("runs_total").increment(1);
        gauge!("run_last_ts").set(now as f64);
        self.log.info(
            LOG_SOURCE,
            format!(
                "Run finished: {} feeds ({} failed), {} matched, {} created, {} skipped, {} failed",
                report.feeds,
                report.feeds_failed,
                report.matched,
                report.created,
                report.skipped,
                report.failed
            ),
        );
        Ok(report)
    }

    async fn summary_for(&self, article: &Article, limit: usize) -> String {
        let summary = self
            .summarizer
            .summarize_labeled(&article.content, limit, &article.title)
            .await;
        if !summary.text.is_empty() {
            return summary.text;
        }
        let excerpt = plain_excerpt(&article.content, limit);
        if excerpt.is_empty() {
            article.title.clone()
        } else {
            excerpt
        }
    }

    async fn publish_digest(&self, now: u64, entries: &[DigestEntry], status: &str) -> Option<PostId> {
        let post = DraftPost {
            title: digest_title(now),
            html_body: render_digest_html(now, entries),
            status: status.to_string(),
            published_at: None,
            category: None,
            metadata: Default::default(),
        };
        match self.publisher.create_draft(&post).await {
            Ok(id) => Some(id),
            Err(e) => {
                counter!("publish_errors_total").increment(1);
                self.log
                    .error(LOG_SOURCE, format!("Failed to create digest post: {e:#}"));
                None
            }
        }
    }
}
