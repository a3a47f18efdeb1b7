// src/rate_limit.rs
//! Per-provider fixed-window request counter.
//!
//! - First call for an unseen provider always passes and opens a window.
//! - Once `window_secs` have elapsed since the window opened, it resets.
//! - Inside a window, calls pass while `count < max_requests`.
//! - `count` only moves through `record_usage`, called after a confirmed
//!   successful remote call, so failures do not consume quota.
//!
//! State is in-memory and per process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: u64,
}

pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    windows: Mutex<HashMap<String, RateWindow>>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            limits: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// openai: 3 requests / 60s, claude: 2 requests / 60s.
    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(clock)
            .with_limit(
                "openai",
                RateLimit {
                    max_requests: 3,
                    window_secs: 60,
                },
            )
            .with_limit(
                "claude",
                RateLimit {
                    max_requests: 2,
                    window_secs: 60,
                },
            )
    }

    pub fn with_limit(mut self, provider: &str, limit: RateLimit) -> Self {
        self.limits.insert(provider.to_string(), limit);
        self
    }

    pub fn limit_for(&self, provider: &str) -> Option<RateLimit> {
        self.limits.get(provider).copied()
    }

    /// Whether a call to `provider` may go out now. Providers without a
    /// configured limit are never throttled.
    pub fn allow(&self, provider: &str) -> bool {
        let Some(limit) = self.limit_for(provider) else {
            return true;
        };
        let now = self.clock.now_unix();
        let mut windows = self.lock();

        let Some(w) = windows.get_mut(provider) else {
            windows.insert(
                provider.to_string(),
                RateWindow {
                    count: 0,
                    window_start: now,
                },
            );
            return true;
        };

        if now.saturating_sub(w.window_start) > limit.window_secs {
            w.count = 0;
            w.window_start = now;
            return true;
        }

        if w.count >= limit.max_requests {
            tracing::info!(provider, count = w.count, "rate limit reached");
            return false;
        }
        true
    }

    /// Count one successful remote call against the current window.
    pub fn record_usage(&self, provider: &str) {
        let now = self.clock.now_unix();
        let mut windows = self.lock();
        let w = windows.entry(provider.to_string()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });
        w.count = w.count.saturating_add(1);
    }

    pub fn window(&self, provider: &str) -> Option<RateWindow> {
        self.lock().get(provider).copied()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        match self.windows.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}
