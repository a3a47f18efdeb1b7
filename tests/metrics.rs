// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use feed_summarizer::cache::{MemoryCache, SharedCache};
use feed_summarizer::clock::ManualClock;
use feed_summarizer::config::{self, Settings};
use feed_summarizer::feed::{FeedFetcher, FixtureTransport};
use feed_summarizer::logging::EventLog;
use feed_summarizer::metrics::Metrics;
use feed_summarizer::publish::MemoryPublisher;
use feed_summarizer::rate_limit::RateLimiter;
use feed_summarizer::summarize::Summarizer;
use feed_summarizer::Orchestrator;

// The recorder is process-global, so everything lives in one test.
#[tokio::test]
async fn metrics_endpoint_contains_run_series() {
    let metrics = Metrics::init().expect("install recorder");

    let clock = Arc::new(ManualClock::new(1_749_600_000));
    let cache: SharedCache = Arc::new(MemoryCache::new(clock.clone()));
    let log = Arc::new(EventLog::new(clock.clone()));
    let transport = FixtureTransport::new().with_doc(
        "https://w/rss",
        200,
        "<rss><channel><title>W</title><item><title>Attack report</title><link>https://w/1</link><description>Short. Text.</description></item></channel></rss>",
    );
    let orchestrator = Orchestrator::new(
        config::handle(Settings {
            feeds: "https://w/rss\nhttps://down/rss".into(),
            keywords: "attack".into(),
            create_digest: false,
            ..Settings::default()
        }),
        FeedFetcher::new(Arc::new(transport), cache.clone(), log.clone()),
        Summarizer::new(
            Vec::new(),
            Arc::new(RateLimiter::with_defaults(clock.clone())),
            cache.clone(),
            log.clone(),
        ),
        cache,
        Arc::new(MemoryPublisher::new()),
        log,
        clock,
    );
    orchestrator.run_cycle().await.expect("run");
    orchestrator.run_cycle().await.expect("run");

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "feed_fetch_total",
        "feed_cache_hits_total",
        "feed_errors_total",
        "summaries_total",
        "posts_created_total",
        "posts_skipped_total",
        "runs_total",
        "run_last_ts",
    ] {
        assert!(text.contains(needle), "missing {needle} in:\n{text}");
    }
}
