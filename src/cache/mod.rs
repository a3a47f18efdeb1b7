//! Key/value cache with per-entry expiry.
//!
//! Shared by the feed fetcher (feed snapshots), the summarizer (summaries) and
//! the orchestrator (processed markers). Values are opaque strings; the typed
//! helpers in [`CacheExt`] store JSON.

pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;

pub use file::FileCache;
pub use memory::MemoryCache;

pub const SUMMARY_TTL_SECS: u64 = 86_400;
pub const FEED_TTL_SECS: u64 = 1_800;
pub const PROCESSED_TTL_SECS: u64 = 30 * 86_400;

/// A `get` triggers a full expiry sweep with probability 1/N.
pub const DEFAULT_SWEEP_ONE_IN: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: u64,
    pub created_at: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub size_bytes: usize,
    pub oldest_created_at: Option<u64>,
    pub newest_created_at: Option<u64>,
}

impl CacheStats {
    pub(crate) fn from_entries<'a>(entries: impl Iterator<Item = &'a CacheEntry>, now: u64) -> Self {
        let mut stats = CacheStats::default();
        for e in entries {
            stats.total_entries += 1;
            if e.is_expired(now) {
                stats.expired_entries += 1;
            }
            stats.size_bytes += e.value.len();
            stats.oldest_created_at = Some(
                stats
                    .oldest_created_at
                    .map_or(e.created_at, |o| o.min(e.created_at)),
            );
            stats.newest_created_at = Some(
                stats
                    .newest_created_at
                    .map_or(e.created_at, |n| n.max(e.created_at)),
            );
        }
        stats
    }
}

pub trait CacheStore: Send + Sync {
    /// Returns the value unless the key is missing or expired. A miss is silent.
    fn get(&self, key: &str) -> Option<String>;

    /// Insert or overwrite `key`, resetting its TTL.
    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()>;

    /// Remove `key`. Returns whether something was removed.
    fn delete(&self, key: &str) -> bool;

    /// Remove every expired entry. Returns the number removed.
    fn sweep(&self) -> usize;

    /// Remove everything. Returns the number removed.
    fn flush(&self) -> usize;

    /// Remove entries created more than `max_age_secs` ago, expired or not.
    fn prune_older_than(&self, max_age_secs: u64) -> usize;

    fn stats(&self) -> CacheStats;
}

pub type SharedCache = Arc<dyn CacheStore>;

/// JSON helpers over any [`CacheStore`].
pub trait CacheExt {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T>;
    fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> anyhow::Result<()>;
}

impl<C: CacheStore + ?Sized> CacheExt for C {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                // Unreadable payloads behave like a miss.
                tracing::debug!(error = %e, key, "cache payload did not decode");
                None
            }
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl_secs)
    }
}

/// `prefix` followed by the hex SHA-256 of `input`.
pub fn hashed_key(prefix: &str, input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(prefix.len() + 64);
    out.push_str(prefix);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn roll_sweep(one_in: u32) -> bool {
    use rand::Rng;
    one_in > 0 && rand::rng().random_ratio(1, one_in)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_key_is_prefixed_and_stable() {
        let a = hashed_key("feed_", "https://example.com/rss");
        let b = hashed_key("feed_", "https://example.com/rss");
        assert_eq!(a, b);
        assert!(a.starts_with("feed_"));
        assert_eq!(a.len(), "feed_".len() + 64);
        assert_ne!(a, hashed_key("feed_", "https://example.com/atom"));
    }

    #[test]
    fn stats_track_oldest_newest_and_expired() {
        let entries = [
            CacheEntry {
                key: "a".into(),
                value: "xx".into(),
                expires_at: 50,
                created_at: 10,
            },
            CacheEntry {
                key: "b".into(),
                value: "yyy".into(),
                expires_at: 500,
                created_at: 30,
            },
        ];
        let s = CacheStats::from_entries(entries.iter(), 100);
        assert_eq!(s.total_entries, 2);
        assert_eq!(s.expired_entries, 1);
        assert_eq!(s.size_bytes, 5);
        assert_eq!(s.oldest_created_at, Some(10));
        assert_eq!(s.newest_created_at, Some(30));
    }
}
