//! Run log: every message goes to `tracing`, and a bounded in-memory history
//! is kept for the `/logs` endpoints.
//!
//! Error and critical entries are also emitted on the `host` target, which is
//! the channel the hosting process watches for failures.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;

pub const DEFAULT_LOG_CAPACITY: usize = 2_000;
pub const DEFAULT_LOG_MAX_AGE_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    pub fn is_error(self) -> bool {
        self >= LogLevel::Error
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            other => anyhow::bail!("unknown log level: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogEntry {
    pub ts_unix: u64,
    pub level: LogLevel,
    pub message: String,
    /// Component that logged, e.g. "fetcher", "summarizer".
    pub source: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub source: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total_logs: usize,
    pub error_count: usize,
    pub latest_error: Option<LogEntry>,
    pub logs_today: usize,
}

pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    cap: usize,
    clock: SharedClock,
}

impl EventLog {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(clock, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(clock: SharedClock, cap: usize) -> Self {
        let cap = cap.clamp(1, 100_000);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cap.min(1_024))),
            cap,
            clock,
        }
    }

    pub fn log(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        let message = message.into();
        emit(level, source, &message);

        let entry = LogEntry {
            ts_unix: self.clock.now_unix(),
            level,
            message,
            source: source.to_string(),
        };
        let mut v = self.lock();
        v.push_back(entry);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    pub fn debug(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, source, message)
    }
    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, source, message)
    }
    pub fn notice(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Notice, source, message)
    }
    pub fn warning(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Warning, source, message)
    }
    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, source, message)
    }
    pub fn critical(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Critical, source, message)
    }

    /// Newest first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogEntry> {
        let needle = q.search.as_deref().map(str::to_lowercase);
        let limit = q.limit.unwrap_or(50);
        self.lock()
            .iter()
            .rev()
            .filter(|e| q.level.is_none_or(|l| e.level == l))
            .filter(|e| q.source.as_deref().is_none_or(|s| e.source == s))
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|n| e.message.to_lowercase().contains(n))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> LogStats {
        let day_start = self.clock.now_unix() / 86_400 * 86_400;
        let v = self.lock();
        LogStats {
            total_logs: v.len(),
            error_count: v.iter().filter(|e| e.level.is_error()).count(),
            latest_error: v.iter().rev().find(|e| e.level.is_error()).cloned(),
            logs_today: v.iter().filter(|e| e.ts_unix >= day_start).count(),
        }
    }

    /// Drop entries older than `days`. Returns the number removed.
    pub fn prune_older_than_days(&self, days: u64) -> usize {
        let cutoff = self.clock.now_unix().saturating_sub(days * 86_400);
        let mut v = self.lock();
        let before = v.len();
        v.retain(|e| e.ts_unix >= cutoff);
        before - v.len()
    }

    pub fn export_json(&self) -> anyhow::Result<String> {
        let v = self.lock();
        let rows: Vec<&LogEntry> = v.iter().rev().collect();
        Ok(serde_json::to_string(&rows)?)
    }

    pub fn export_csv(&self) -> String {
        let v = self.lock();
        let mut out = String::from("Timestamp,Level,Message,Source\n");
        for e in v.iter().rev() {
            let ts = chrono::DateTime::from_timestamp(e.ts_unix as i64, 0)
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            out.push_str(&format!(
                "\"{}\",\"{}\",\"{}\",\"{}\"\n",
                ts,
                e.level,
                e.message.replace('"', "\"\""),
                e.source.replace('"', "\"\"")
            ));
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

fn emit(level: LogLevel, source: &str, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(source, "{message}"),
        LogLevel::Info => tracing::info!(source, "{message}"),
        LogLevel::Notice => tracing::info!(source, notice = true, "{message}"),
        LogLevel::Warning => tracing::warn!(source, "{message}"),
        LogLevel::Error | LogLevel::Critical => {
            tracing::error!(source, severity = level.as_str(), "{message}");
            tracing::error!(target: "host", source, severity = level.as_str(), "feed-summarizer: {message}");
        }
    }
}
