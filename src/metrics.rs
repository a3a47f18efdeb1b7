use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Feed fetches that went to the network.");
        describe_counter!("feed_cache_hits_total", "Feed snapshots served from cache.");
        describe_counter!("feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!("feed_items_total", "Items parsed from feeds.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("summaries_total", "Summaries produced, by source.");
        describe_counter!("summary_cache_hits_total", "Summaries served from cache.");
        describe_counter!("provider_errors_total", "Remote provider failures.");
        describe_histogram!("provider_latency_ms", "Remote provider latency in milliseconds.");
        describe_counter!("posts_created_total", "Draft posts created.");
        describe_counter!("posts_skipped_total", "Articles skipped as already processed.");
        describe_counter!("publish_errors_total", "Publisher failures.");
        describe_counter!("runs_total", "Completed run cycles.");
        describe_gauge!("run_last_ts", "Unix ts when the last run finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once, from the binary.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
