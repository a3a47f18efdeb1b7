// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use tokio::task::JoinHandle;

use crate::config::{self, Settings};
use crate::logging::DEFAULT_LOG_MAX_AGE_DAYS;
use crate::orchestrator::Orchestrator;

pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub enabled: bool,
    /// Empty means every day.
    pub days: Vec<Weekday>,
    pub at: NaiveTime,
}

impl Schedule {
    pub fn from_settings(s: &Settings) -> Result<Self> {
        let days = s
            .schedule_days
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("unknown weekday in schedule_days: {d}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let at = NaiveTime::parse_from_str(s.schedule_time.trim(), "%H:%M")
            .with_context(|| format!("schedule_time must be HH:MM, got {:?}", s.schedule_time))?;
        Ok(Self {
            enabled: s.auto_fetch,
            days,
            at,
        })
    }
}

/// At most one run per calendar day, on a scheduled weekday, once the
/// configured time of day has passed.
pub fn is_due(now: NaiveDateTime, last_run_day: Option<NaiveDate>, schedule: &Schedule) -> bool {
    if !schedule.enabled {
        return false;
    }
    if last_run_day == Some(now.date()) {
        return false;
    }
    if !schedule.days.is_empty() && !schedule.days.contains(&now.weekday()) {
        return false;
    }
    now.time() >= schedule.at
}

/// Background loop: checks the schedule every `tick`, runs the cycle when due
/// and does daily housekeeping (expired cache entries, old log lines).
pub fn spawn_scheduler(orchestrator: Arc<Orchestrator>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        let mut last_run_day: Option<NaiveDate> = None;
        let mut last_housekeeping: Option<NaiveDate> = None;
        loop {
            ticker.tick().await;
            let now = Local::now().naive_local();

            if last_housekeeping != Some(now.date()) {
                last_housekeeping = Some(now.date());
                let swept = orchestrator.cache().sweep();
                let pruned = orchestrator.log().prune_older_than_days(DEFAULT_LOG_MAX_AGE_DAYS);
                tracing::info!(target: "scheduler", swept, pruned, "daily housekeeping");
            }

            let settings = config::snapshot(orchestrator.settings());
            let schedule = match Schedule::from_settings(&settings) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = ?e, "invalid schedule settings");
                    continue;
                }
            };
            if !is_due(now, last_run_day, &schedule) {
                continue;
            }
            last_run_day = Some(now.date());

            match orchestrator.run_cycle().await {
                Ok(r) => tracing::info!(
                    target: "scheduler",
                    created = r.created,
                    skipped = r.skipped,
                    failed = r.failed,
                    "scheduled run finished"
                ),
                Err(e) => tracing::warn!(target: "scheduler", error = %e, "scheduled run skipped"),
            }
        }
    })
}
