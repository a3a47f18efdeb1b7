use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::cache::CacheStats;
use crate::config::{clamp_word_limit, Settings};
use crate::feed::FeedProbe;
use crate::logging::{LogEntry, LogQuery, LogStats};
use crate::orchestrator::{Orchestrator, RunError};
use crate::summarize::text::word_count;
use crate::summarize::ProviderProbe;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/run", post(run_now))
        .route("/feeds/test", get(test_feed))
        .route("/summarize", post(summarize))
        .route("/providers/probe", get(probe_providers))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/flush", post(cache_flush))
        .route("/logs", get(logs))
        .route("/logs/stats", get(log_stats))
        .route("/logs/export", get(log_export))
        .route("/admin/reload-settings", post(admin_reload_settings))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: msg.into() })).into_response()
}

async fn run_now(State(state): State<AppState>) -> Response {
    match state.orchestrator.run_cycle().await {
        Ok(report) => Json(report).into_response(),
        Err(e @ RunError::MissingConfig(_)) => {
            error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

#[derive(serde::Deserialize)]
struct FeedTestQuery {
    url: Option<String>,
}

async fn test_feed(
    State(state): State<AppState>,
    Query(q): Query<FeedTestQuery>,
) -> Result<Json<FeedProbe>, Response> {
    let url = q
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "missing url"))?;
    Ok(Json(state.orchestrator.test_feed(&url).await))
}

#[derive(serde::Deserialize)]
struct SummarizeReq {
    content: String,
    #[serde(default)]
    word_limit: Option<usize>,
}

#[derive(serde::Serialize)]
struct SummarizeResp {
    summary: String,
    word_count: usize,
    word_limit: usize,
    source: &'static str,
}

async fn summarize(
    State(state): State<AppState>,
    Json(body): Json<SummarizeReq>,
) -> Json<SummarizeResp> {
    let limit = match body.word_limit {
        Some(n) => clamp_word_limit(n),
        None => crate::config::snapshot(state.orchestrator.settings()).word_limit(),
    };
    let s = state
        .orchestrator
        .summarizer()
        .summarize_labeled(&body.content, limit, "api request")
        .await;
    Json(SummarizeResp {
        word_count: word_count(&s.text),
        summary: s.text,
        word_limit: limit,
        source: s.source.label(),
    })
}

async fn probe_providers(State(state): State<AppState>) -> Json<Vec<ProviderProbe>> {
    Json(state.orchestrator.summarizer().probe_all().await)
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.orchestrator.cache().stats())
}

#[derive(serde::Serialize)]
struct FlushResp {
    removed: usize,
}

async fn cache_flush(State(state): State<AppState>) -> Json<FlushResp> {
    let removed = state.orchestrator.cache().flush();
    state
        .orchestrator
        .log()
        .notice("api", format!("Cache flushed ({removed} entries)"));
    Json(FlushResp { removed })
}

async fn logs(State(state): State<AppState>, Query(q): Query<LogQuery>) -> Json<Vec<LogEntry>> {
    Json(state.orchestrator.log().query(&q))
}

async fn log_stats(State(state): State<AppState>) -> Json<LogStats> {
    Json(state.orchestrator.log().stats())
}

#[derive(serde::Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: Option<String>,
}

async fn log_export(State(state): State<AppState>, Query(q): Query<ExportQuery>) -> Response {
    let log = state.orchestrator.log();
    match q.format.as_deref().unwrap_or("json") {
        "csv" => (
            [(shuttle_axum::axum::http::header::CONTENT_TYPE, "text/csv")],
            log.export_csv(),
        )
            .into_response(),
        "json" => match log.export_json() {
            Ok(body) => (
                [(shuttle_axum::axum::http::header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
        },
        other => error(StatusCode::BAD_REQUEST, format!("unknown format: {other}")),
    }
}

/// Re-read the settings file. Feeds, keywords, schedule, word limit, digest
/// and post status apply to the next run; provider keys and the publisher
/// backend are fixed at start-up.
async fn admin_reload_settings(State(state): State<AppState>) -> Response {
    let fresh = match Settings::load_default() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = ?e, "settings reload failed");
            return error(StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}"));
        }
    };
    match state.orchestrator.settings().write() {
        Ok(mut w) => {
            *w = fresh;
            "reloaded".into_response()
        }
        Err(_) => error(StatusCode::INTERNAL_SERVER_ERROR, "failed: lock poisoned"),
    }
}
