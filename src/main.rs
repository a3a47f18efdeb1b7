//! Feed summarizer service: binary entrypoint.
//! Boots the Axum HTTP server, the daily scheduler and the Prometheus exporter.

use std::sync::Arc;

use feed_summarizer::clock::system_clock;
use feed_summarizer::config::{self, Settings};
use feed_summarizer::logging::EventLog;
use feed_summarizer::metrics::Metrics;
use feed_summarizer::scheduler::{spawn_scheduler, DEFAULT_TICK};
use feed_summarizer::{create_router, AppState, Orchestrator};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEED_SUMMARIZER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEED_SUMMARIZER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_summarizer=info,warn"));

    // Shuttle may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let settings = Settings::load_default()
        .map_err(|e| shuttle_runtime::Error::Custom(e.context("loading settings")))?;
    let clock = system_clock();
    let log = Arc::new(EventLog::new(clock.clone()));

    let orchestrator = Orchestrator::from_settings(config::handle(settings), clock, log)
        .map_err(|e| shuttle_runtime::Error::Custom(e.context("building orchestrator")))?;
    let orchestrator = Arc::new(orchestrator);

    spawn_scheduler(orchestrator.clone(), DEFAULT_TICK);

    let metrics = Metrics::init()
        .map_err(|e| shuttle_runtime::Error::Custom(e.context("installing metrics recorder")))?;

    let router = create_router(AppState::new(orchestrator)).merge(metrics.router());

    Ok(router.into())
}
