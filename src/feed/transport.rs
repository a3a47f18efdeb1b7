use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub status: u16,
    pub body: String,
}

/// How feed documents are retrieved. Errors mean the feed was unreachable;
/// HTTP-level failures come back as a non-200 `status`.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedBody>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedBody> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        Ok(FetchedBody { status, body })
    }
}

/// Serves canned documents by URL; unknown URLs fail like an unreachable
/// host. Counts requests so callers can tell cache hits from fetches.
#[derive(Default)]
pub struct FixtureTransport {
    docs: Mutex<HashMap<String, FetchedBody>>,
    requests: AtomicUsize,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(self, url: &str, status: u16, body: &str) -> Self {
        self.insert(url, status, body);
        self
    }

    pub fn insert(&self, url: &str, status: u16, body: &str) {
        let mut docs = match self.docs.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        docs.insert(
            url.to_string(),
            FetchedBody {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedTransport for FixtureTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchedBody> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let docs = match self.docs.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        docs.get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fixture: no route to {url}"))
    }
}
