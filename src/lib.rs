// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod feed;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod publish;
pub mod rate_limit;
pub mod scheduler;
pub mod summarize;

/// Sent on every outgoing request (feeds, providers, WordPress).
pub const USER_AGENT: &str = concat!("feed-summarizer/", env!("CARGO_PKG_VERSION"));

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::orchestrator::{Orchestrator, RunError, RunReport};
