use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{roll_sweep, CacheEntry, CacheStats, CacheStore, DEFAULT_SWEEP_ONE_IN};
use crate::clock::SharedClock;

/// Process-local cache. Entries live until they expire or the process exits.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: SharedClock,
    sweep_one_in: u32,
}

impl MemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            sweep_one_in: DEFAULT_SWEEP_ONE_IN,
        }
    }

    /// `0` disables the opportunistic sweep on `get`.
    pub fn with_sweep_one_in(mut self, one_in: u32) -> Self {
        self.sweep_one_in = one_in;
        self
    }

    /// Physically stored entries, including expired ones not yet swept.
    pub fn raw_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        if roll_sweep(self.sweep_one_in) {
            self.sweep();
        }
        let now = self.clock.now_unix();
        let mut map = self.lock();
        match map.get(key) {
            Some(e) if !e.is_expired(now) => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let now = self.clock.now_unix();
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: now.saturating_add(ttl_secs),
            created_at: now,
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now_unix();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| !e.is_expired(now));
        before - map.len()
    }

    fn flush(&self) -> usize {
        let mut map = self.lock();
        let n = map.len();
        map.clear();
        n
    }

    fn prune_older_than(&self, max_age_secs: u64) -> usize {
        let cutoff = self.clock.now_unix().saturating_sub(max_age_secs);
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| e.created_at >= cutoff);
        before - map.len()
    }

    fn stats(&self) -> CacheStats {
        let now = self.clock.now_unix();
        let map = self.lock();
        CacheStats::from_entries(map.values(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheExt;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache_at(start: u64) -> (Arc<ManualClock>, MemoryCache) {
        let clock = Arc::new(ManualClock::new(start));
        let cache = MemoryCache::new(clock.clone()).with_sweep_one_in(0);
        (clock, cache)
    }

    #[test]
    fn expired_entry_is_a_miss_after_time_advance() {
        let (clock, cache) = cache_at(1_000);
        cache.set("k", "v", 1).unwrap();
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        clock.advance(2);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn set_overwrites_value_and_ttl() {
        let (clock, cache) = cache_at(1_000);
        cache.set("k", "old", 10).unwrap();
        clock.advance(5);
        cache.set("k", "new", 100).unwrap();
        clock.advance(50);
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.raw_len(), 1);
    }

    #[test]
    fn missing_key_and_delete() {
        let (_clock, cache) = cache_at(1_000);
        assert_eq!(cache.get("nope"), None);
        assert!(!cache.delete("nope"));
        cache.set("k", "v", 10).unwrap();
        assert!(cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (clock, cache) = cache_at(1_000);
        cache.set("short", "1", 5).unwrap();
        cache.set("long", "2", 500).unwrap();
        clock.advance(10);
        assert_eq!(cache.raw_len(), 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.raw_len(), 1);
        assert_eq!(cache.get("long").as_deref(), Some("2"));
    }

    #[test]
    fn prune_uses_creation_time() {
        let (clock, cache) = cache_at(1_000);
        cache.set("old", "1", 10_000).unwrap();
        clock.advance(100);
        cache.set("young", "2", 10_000).unwrap();
        assert_eq!(cache.prune_older_than(50), 1);
        assert_eq!(cache.get("old"), None);
        assert!(cache.get("young").is_some());
    }

    #[test]
    fn json_helpers_round_trip_and_flush() {
        let (_clock, cache) = cache_at(1_000);
        cache.set_json("marker", &true, 60).unwrap();
        assert_eq!(cache.get_json::<bool>("marker"), Some(true));
        cache.set("garbage", "{not json", 60).unwrap();
        assert_eq!(cache.get_json::<bool>("garbage"), None);
        assert_eq!(cache.flush(), 2);
        assert_eq!(cache.stats().total_entries, 0);
    }
}
