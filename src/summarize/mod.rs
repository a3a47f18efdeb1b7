//! Summarization pipeline: cache → OpenAI → Claude → local fallback.
//!
//! `summarize` never fails. The worst case is the local fallback, which may be
//! an empty string when the input had no usable sentences; callers treat empty
//! as "no summary available".

pub mod claude;
pub mod openai;
pub mod text;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Serialize;

use crate::cache::{hashed_key, SharedCache, SUMMARY_TTL_SECS};
use crate::config::{clamp_word_limit, Settings};
use crate::logging::EventLog;
use crate::rate_limit::RateLimiter;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;
pub(crate) use crate::USER_AGENT;
use text::{clean_content, fallback_summary, format_summary};

pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

const LOG_SOURCE: &str = "summarizer";
const PROBE_TEXT: &str =
    "This is a test article. Please summarize it to verify the API connection is working.";

/// What a single remote provider produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Success(String),
    /// Not attempted (e.g. no credential). Not an error.
    Skipped(&'static str),
    Failure(String),
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Stable id, also the rate-limiter key.
    fn name(&self) -> &'static str;
    fn is_configured(&self) -> bool;
    async fn summarize(&self, content: &str, word_limit: usize) -> ProviderOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Cache,
    Provider(&'static str),
    Fallback,
}

impl SummarySource {
    pub fn label(&self) -> &'static str {
        match self {
            SummarySource::Cache => "cache",
            SummarySource::Provider(name) => name,
            SummarySource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderProbe {
    pub provider: &'static str,
    pub configured: bool,
    pub success: bool,
    pub message: String,
}

pub fn build_prompt(content: &str, word_limit: usize) -> String {
    format!(
        "Summarize the following article in approximately {word_limit} words. Focus on key facts and maintain journalistic objectivity:\n\n{content}"
    )
}

/// Cache key for a cleaned text at a given (already clamped) limit.
pub fn summary_cache_key(cleaned: &str, word_limit: usize) -> String {
    hashed_key("summary_", &format!("{cleaned}{word_limit}"))
}

pub struct Summarizer {
    providers: Vec<Box<dyn SummaryProvider>>,
    limiter: Arc<RateLimiter>,
    cache: SharedCache,
    log: Arc<EventLog>,
}

impl Summarizer {
    /// `providers` are tried in the given order.
    pub fn new(
        providers: Vec<Box<dyn SummaryProvider>>,
        limiter: Arc<RateLimiter>,
        cache: SharedCache,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            providers,
            limiter,
            cache,
            log,
        }
    }

    /// OpenAI first, Claude second, both from settings.
    pub fn from_settings(
        settings: &Settings,
        limiter: Arc<RateLimiter>,
        cache: SharedCache,
        log: Arc<EventLog>,
    ) -> anyhow::Result<Self> {
        let providers: Vec<Box<dyn SummaryProvider>> = vec![
            Box::new(OpenAiProvider::new(
                settings.openai_api_key.clone(),
                settings.openai_model.clone(),
            )?),
            Box::new(ClaudeProvider::new(
                settings.claude_api_key.clone(),
                settings.claude_model.clone(),
            )?),
        ];
        Ok(Self::new(providers, limiter, cache, log))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn summarize(&self, content: &str, word_limit: usize) -> String {
        self.summarize_labeled(content, word_limit, "").await.text
    }

    /// Full pipeline. `label` (usually the article title) only appears in
    /// log lines.
    pub async fn summarize_labeled(&self, content: &str, word_limit: usize, label: &str) -> Summary {
        crate::metrics::describe_all();

        let limit = clamp_word_limit(word_limit);
        let cleaned = clean_content(content);
        let key = summary_cache_key(&cleaned, limit);

        if let Some(hit) = self.cache.get(&key) {
            counter!("summary_cache_hits_total").increment(1);
            return Summary {
                text: hit,
                source: SummarySource::Cache,
            };
        }

        let mut won = None;
        for p in &self.providers {
            if let Some(text) = self.attempt(p.as_ref(), &cleaned, limit, label).await {
                won = Some(Summary {
                    text,
                    source: SummarySource::Provider(p.name()),
                });
                break;
            }
        }

        let summary = won.unwrap_or_else(|| {
            self.log
                .notice(LOG_SOURCE, "Using fallback summarization method");
            Summary {
                text: format_summary(&fallback_summary(&cleaned, limit), limit),
                source: SummarySource::Fallback,
            }
        });

        counter!("summaries_total", "source" => summary.source.label()).increment(1);

        if !summary.text.is_empty() {
            if let Err(e) = self.cache.set(&key, &summary.text, SUMMARY_TTL_SECS) {
                tracing::warn!(error = ?e, "caching summary failed");
            }
        }
        summary
    }

    /// One remote attempt. Returns the post-processed text on success.
    async fn attempt(
        &self,
        p: &dyn SummaryProvider,
        content: &str,
        limit: usize,
        label: &str,
    ) -> Option<String> {
        let name = p.name();
        if !self.limiter.allow(name) {
            self.log
                .notice(LOG_SOURCE, format!("Rate limit reached for {name}"));
            return None;
        }
        if !p.is_configured() {
            self.log
                .debug(LOG_SOURCE, format!("{name} skipped: no API key"));
            return None;
        }

        let t0 = Instant::now();
        let outcome = p.summarize(content, limit).await;
        histogram!("provider_latency_ms", "provider" => name)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        let about = if label.is_empty() {
            String::new()
        } else {
            format!(" (article: {label})")
        };

        match outcome {
            ProviderOutcome::Success(raw) => {
                self.limiter.record_usage(name);
                let text = format_summary(&raw, limit);
                if text.is_empty() {
                    counter!("provider_errors_total", "provider" => name).increment(1);
                    self.log.error(
                        LOG_SOURCE,
                        format!("{name} error: summary was empty after cleaning{about}"),
                    );
                    return None;
                }
                Some(text)
            }
            ProviderOutcome::Skipped(reason) => {
                self.log
                    .debug(LOG_SOURCE, format!("{name} skipped: {reason}"));
                None
            }
            ProviderOutcome::Failure(reason) => {
                counter!("provider_errors_total", "provider" => name).increment(1);
                self.log
                    .error(LOG_SOURCE, format!("{name} error: {reason}{about}"));
                None
            }
        }
    }

    /// Diagnostic: one short summarization against a single provider, bypassing
    /// the cache. Respects the rate limiter like a normal call.
    pub async fn probe_provider(&self, name: &str) -> Option<ProviderProbe> {
        let p = self.providers.iter().find(|p| p.name() == name)?;
        let provider = p.name();
        if !p.is_configured() {
            return Some(ProviderProbe {
                provider,
                configured: false,
                success: false,
                message: format!("{provider} API key is not configured"),
            });
        }
        let ok = self
            .attempt(p.as_ref(), PROBE_TEXT, 100, "connection probe")
            .await
            .is_some();
        Some(ProviderProbe {
            provider,
            configured: true,
            success: ok,
            message: if ok {
                format!("{provider} API connection successful. Test summary generated.")
            } else {
                format!("Failed to generate test summary using {provider} API")
            },
        })
    }

    pub async fn probe_all(&self) -> Vec<ProviderProbe> {
        let mut out = Vec::with_capacity(self.providers.len());
        for name in self.provider_names() {
            if let Some(p) = self.probe_provider(name).await {
                out.push(p);
            }
        }
        out
    }
}
