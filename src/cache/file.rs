//! Directory-backed cache: one JSON file per key.
//!
//! File names are the SHA-256 of the key, so a key maps to exactly one file.
//! Writes go to a temp file and are renamed into place; concurrent writers from
//! several processes therefore end with the last rename winning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{hashed_key, roll_sweep, CacheEntry, CacheStats, CacheStore, DEFAULT_SWEEP_ONE_IN};
use crate::clock::SharedClock;

pub struct FileCache {
    dir: PathBuf,
    clock: SharedClock,
    sweep_one_in: u32,
}

impl FileCache {
    pub fn open(dir: impl Into<PathBuf>, clock: SharedClock) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        Ok(Self {
            dir,
            clock,
            sweep_one_in: DEFAULT_SWEEP_ONE_IN,
        })
    }

    pub fn with_sweep_one_in(mut self, one_in: u32) -> Self {
        self.sweep_one_in = one_in;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hashed_key("", key)))
    }

    fn read_entry(path: &Path) -> Option<CacheEntry> {
        let s = fs::read_to_string(path).ok()?;
        serde_json::from_str(&s).ok()
    }

    /// All readable entries with their paths. Unreadable files are skipped.
    fn scan(&self) -> Vec<(PathBuf, CacheEntry)> {
        let Ok(rd) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        rd.flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .filter_map(|p| Self::read_entry(&p).map(|e| (p, e)))
            .collect()
    }

    fn remove_where(&self, pred: impl Fn(&CacheEntry) -> bool) -> usize {
        let mut removed = 0;
        for (path, entry) in self.scan() {
            if pred(&entry) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        if roll_sweep(self.sweep_one_in) {
            self.sweep();
        }
        let path = self.path_for(key);
        let entry = Self::read_entry(&path)?;
        if entry.key != key {
            return None;
        }
        if entry.is_expired(self.clock.now_unix()) {
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(entry.value)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let now = self.clock.now_unix();
        let entry = CacheEntry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: now.saturating_add(ttl_secs),
            created_at: now,
        };
        let path = self.path_for(key);
        let tmp = path.with_extension(format!(
            "{}.{:08x}.tmp",
            std::process::id(),
            rand::random::<u32>()
        ));
        let json = serde_json::to_vec(&entry)?;
        let written = fs::File::create(&tmp)
            .and_then(|mut f| f.write_all(&json))
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("writing cache file {}", path.display()));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> bool {
        fs::remove_file(self.path_for(key)).is_ok()
    }

    fn sweep(&self) -> usize {
        let now = self.clock.now_unix();
        self.remove_where(|e| e.is_expired(now))
    }

    fn flush(&self) -> usize {
        self.remove_where(|_| true)
    }

    fn prune_older_than(&self, max_age_secs: u64) -> usize {
        let cutoff = self.clock.now_unix().saturating_sub(max_age_secs);
        self.remove_where(|e| e.created_at < cutoff)
    }

    fn stats(&self) -> CacheStats {
        let now = self.clock.now_unix();
        let entries = self.scan();
        CacheStats::from_entries(entries.iter().map(|(_, e)| e), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn file_cache_expires_and_upserts() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = FileCache::open(tmp.path(), clock.clone())
            .unwrap()
            .with_sweep_one_in(0);

        cache.set("summary_x", "first", 1).unwrap();
        cache.set("summary_x", "second", 60).unwrap();
        assert_eq!(cache.get("summary_x").as_deref(), Some("second"));
        assert_eq!(cache.stats().total_entries, 1);

        cache.set("feed_y", "[]", 1).unwrap();
        clock.advance(2);
        assert_eq!(cache.get("feed_y"), None);
        assert_eq!(cache.get("summary_x").as_deref(), Some("second"));
    }

    #[test]
    fn file_cache_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        {
            let cache = FileCache::open(tmp.path(), clock.clone()).unwrap();
            cache.set("processed_abc", "true", 600).unwrap();
        }
        let cache = FileCache::open(tmp.path(), clock).unwrap().with_sweep_one_in(0);
        assert_eq!(cache.get("processed_abc").as_deref(), Some("true"));
        assert!(cache.delete("processed_abc"));
        assert!(!cache.delete("processed_abc"));
    }

    #[test]
    fn file_cache_sweep_and_flush() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = FileCache::open(tmp.path(), clock.clone())
            .unwrap()
            .with_sweep_one_in(0);
        cache.set("a", "1", 5).unwrap();
        cache.set("b", "2", 500).unwrap();
        clock.advance(10);
        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.flush(), 1);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let cache = FileCache::open(tmp.path(), clock).unwrap().with_sweep_one_in(0);
        // A directory where the entry file should go makes the rename fail.
        fs::create_dir(cache.path_for("blocked")).unwrap();

        assert!(cache.set("blocked", "v", 60).is_err());
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        assert_eq!(cache.get("blocked"), None);
    }
}
