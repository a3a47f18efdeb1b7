//! Runs a single fetch → summarize → draft cycle from the local settings and
//! prints the report as JSON. Handy for cron or for checking a config.

use std::sync::Arc;

use feed_summarizer::clock::system_clock;
use feed_summarizer::config::{self, Settings};
use feed_summarizer::logging::EventLog;
use feed_summarizer::Orchestrator;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feed_summarizer=info,warn")),
        )
        .with_target(false)
        .init();

    let settings = Settings::load_default()?;
    let clock = system_clock();
    let log = Arc::new(EventLog::new(clock.clone()));
    let orchestrator = Orchestrator::from_settings(config::handle(settings), clock, log)?;

    let report = orchestrator.run_cycle().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
