//! Time-boxed per-(location, provider) store of source forecasts.
//!
//! Backed by a `moka` cache so adapters running concurrently can share it.
//! Each entry carries its own expiry, checked on read. A cache opened with
//! [`SourceCache::persistent`] also writes every entry to a JSON file, so a
//! later process can answer from it until the entry expires.

use std::{
    fmt::{Debug, Write as _},
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use crate::{error::SourceError, model::SourceForecast, provider::ForecastSource};

/// Upper bound on how long anything stays in the cache, whatever its TTL.
const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_ENTRIES: u64 = 1_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<SourceForecast>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// On-disk form of one entry, with a wall-clock expiry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    expires_at: DateTime<Utc>,
    forecast: SourceForecast,
}

impl StoredEntry {
    fn remaining(&self) -> Option<Duration> {
        (self.expires_at - Utc::now()).to_std().ok().filter(|left| !left.is_zero())
    }
}

pub struct SourceCache {
    entries: Cache<String, CacheEntry>,
    dir: Option<PathBuf>,
}

impl SourceCache {
    /// In-memory cache, gone with the process.
    pub fn new() -> Self {
        let entries = Cache::builder().max_capacity(MAX_ENTRIES).time_to_live(MAX_TTL).build();
        Self { entries, dir: None }
    }

    /// Cache that also keeps every entry as a file under `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()), ..Self::new() }
    }

    /// Cached forecast for `(location, provider)` if it hasn't expired yet.
    pub fn get(&self, location: &str, provider: &str) -> Option<Arc<SourceForecast>> {
        let key = cache_key(location, provider);

        if let Some(entry) = self.entries.get(&key) {
            if entry.is_fresh(Instant::now()) {
                return Some(entry.value);
            }
            self.entries.invalidate(&key);
            self.remove_file(&key);
            return None;
        }

        let entry = self.load_file(&key)?;
        let value = entry.value.clone();
        self.entries.insert(key, entry);
        Some(value)
    }

    pub fn set(&self, location: &str, provider: &str, value: SourceForecast, ttl: Duration) {
        let ttl = ttl.min(MAX_TTL);
        let key = cache_key(location, provider);

        let value = match self.file_path(&key) {
            Some(path) => {
                let expires_at = chrono::Duration::from_std(ttl).map_or(Utc::now(), |ttl| Utc::now() + ttl);
                let stored = StoredEntry { expires_at, forecast: value };
                if let Err(err) = write_entry(&path, &stored) {
                    tracing::warn!(path = %path.display(), %err, "failed to write cache file");
                }
                stored.forecast
            }
            None => value,
        };

        let entry = CacheEntry { value: Arc::new(value), expires_at: Instant::now() + ttl };
        self.entries.insert(key, entry);
    }

    /// Drop every entry whose TTL has passed, on disk too.
    pub fn clear_expired(&self) {
        let now = Instant::now();
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key)
            .collect();

        for key in expired {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();

        if let Some(dir) = &self.dir {
            self.clear_expired_files(dir);
        }
    }

    /// Number of entries currently held in memory.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(file_name(key)))
    }

    fn load_file(&self, key: &str) -> Option<CacheEntry> {
        let path = self.file_path(key)?;
        let stored = match read_entry(&path) {
            Ok(stored) => stored?,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "dropping unreadable cache file");
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        let Some(remaining) = stored.remaining() else {
            let _ = fs::remove_file(&path);
            return None;
        };

        Some(CacheEntry { value: Arc::new(stored.forecast), expires_at: Instant::now() + remaining })
    }

    fn remove_file(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = fs::remove_file(path);
        }
    }

    fn clear_expired_files(&self, dir: &Path) {
        let Ok(listing) = fs::read_dir(dir) else {
            return;
        };

        for path in listing.flatten().map(|e| e.path()) {
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let keep = matches!(read_entry(&path), Ok(Some(stored)) if stored.remaining().is_some());
            if !keep {
                tracing::debug!(path = %path.display(), "removing expired cache file");
                let _ = fs::remove_file(&path);
            }
        }
    }
}

impl Default for SourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCache")
            .field("entries", &self.entries.entry_count())
            .field("dir", &self.dir)
            .finish()
    }
}

fn cache_key(location: &str, provider: &str) -> String {
    format!("weather:{}:{}", location.to_lowercase().replace(' ', "_"), provider)
}

/// Percent-encode anything outside `[A-Za-z0-9._-]` so every key maps to
/// its own plain file name.
fn file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 5);
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "%{byte:02X}");
        }
    }
    name.push_str(".json");
    name
}

/// `Ok(None)` when there is no file yet.
fn read_entry(path: &Path) -> io::Result<Option<StoredEntry>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    serde_json::from_slice(&contents).map(Some).map_err(io::Error::from)
}

fn write_entry(path: &Path, stored: &StoredEntry) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(stored)?)
}

/// Read-through caching in front of any source.
#[derive(Debug)]
pub struct CachedSource {
    inner: Arc<dyn ForecastSource>,
    cache: Arc<SourceCache>,
    ttl: Duration,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn ForecastSource>, cache: Arc<SourceCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl ForecastSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
        if let Some(hit) = self.cache.get(location, self.name()) {
            tracing::debug!(source = self.name(), location, "cache hit");
            return Ok(hit.as_ref().clone());
        }

        tracing::debug!(source = self.name(), location, "cache miss");
        let fresh = self.inner.fetch(location).await?;
        self.cache.set(location, self.name(), fresh.clone(), self.ttl);
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn forecast(city: &str) -> SourceForecast {
        SourceForecast {
            city: city.into(),
            country: "ES".into(),
            timezone: "UTC+1".into(),
            hourly: Vec::new(),
            daily: Vec::new(),
        }
    }

    #[test]
    fn key_is_case_and_space_insensitive() {
        assert_eq!(cache_key("New York", "metno"), "weather:new_york:metno");
        assert_eq!(cache_key("new york", "metno"), cache_key("NEW YORK", "metno"));
    }

    #[test]
    fn fresh_entry_is_returned() {
        let cache = SourceCache::new();
        cache.set("Madrid", "metno", forecast("Madrid"), Duration::from_secs(60));

        let hit = cache.get("madrid", "metno").expect("entry must be cached");
        assert_eq!(hit.city, "Madrid");
        assert!(cache.get("Madrid", "weatherapi").is_none());
    }

    #[test]
    fn expired_entry_is_dropped() {
        let cache = SourceCache::new();
        cache.set("Madrid", "metno", forecast("Madrid"), Duration::ZERO);

        assert!(cache.get("Madrid", "metno").is_none());
    }

    #[test]
    fn clear_expired_keeps_fresh_entries() {
        let cache = SourceCache::new();
        cache.set("Madrid", "metno", forecast("Madrid"), Duration::ZERO);
        cache.set("Lisbon", "metno", forecast("Lisbon"), Duration::from_secs(60));

        cache.clear_expired();

        assert_eq!(cache.entry_count(), 1);
        assert!(cache.get("Lisbon", "metno").is_some());
    }

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastSource for CountingSource {
        fn name(&self) -> &str {
            "Counting"
        }

        async fn fetch(&self, location: &str) -> Result<SourceForecast, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(forecast(location))
        }
    }

    #[test]
    fn file_names_are_escaped() {
        assert_eq!(file_name("weather:new_york:metno"), "weather%3Anew_york%3Ametno.json");
        assert_eq!(file_name("weather:a/b?c:x"), "weather%3Aa%2Fb%3Fc%3Ax.json");
        assert_ne!(file_name("weather:a/b:x"), file_name("weather:a_b:x"));
    }

    #[test]
    fn persisted_entry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        SourceCache::persistent(dir.path()).set(
            "Madrid",
            "metno",
            forecast("Madrid"),
            Duration::from_secs(60),
        );

        let reopened = SourceCache::persistent(dir.path());
        let hit = reopened.get("MADRID", "metno").expect("entry must be read from disk");

        assert_eq!(hit.city, "Madrid");
        assert_eq!(reopened.entry_count(), 1);
        assert!(reopened.get("Madrid", "weatherapi").is_none());
    }

    #[test]
    fn expired_file_is_ignored_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        SourceCache::persistent(dir.path()).set("Madrid", "metno", forecast("Madrid"), Duration::ZERO);
        let path = dir.path().join(file_name(&cache_key("Madrid", "metno")));
        assert!(path.exists());

        assert!(SourceCache::persistent(dir.path()).get("Madrid", "metno").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file_name(&cache_key("Madrid", "metno")));
        fs::write(&path, b"{ not json").unwrap();

        assert!(SourceCache::persistent(dir.path()).get("Madrid", "metno").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn clear_expired_prunes_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::persistent(dir.path());
        cache.set("Madrid", "metno", forecast("Madrid"), Duration::ZERO);
        cache.set("Lisbon", "metno", forecast("Lisbon"), Duration::from_secs(60));
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        SourceCache::persistent(dir.path()).clear_expired();

        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, [file_name(&cache_key("Lisbon", "metno")), "notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn reopened_cache_serves_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::from_secs(60);

        let first_run = Arc::new(CountingSource::default());
        CachedSource::new(first_run.clone(), Arc::new(SourceCache::persistent(dir.path())), ttl)
            .fetch("Porto")
            .await
            .unwrap();

        let second_run = Arc::new(CountingSource::default());
        let source =
            CachedSource::new(second_run.clone(), Arc::new(SourceCache::persistent(dir.path())), ttl);
        let cached = source.fetch("porto").await.unwrap();

        assert_eq!(cached.city, "Porto");
        assert_eq!(first_run.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_run.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_source_fetches_once_within_ttl() {
        let inner = Arc::new(CountingSource::default());
        let cache = Arc::new(SourceCache::new());
        let source = CachedSource::new(inner.clone(), cache, Duration::from_secs(60));

        let first = source.fetch("Porto").await.unwrap();
        let second = source.fetch("porto").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.name(), "Counting");
    }
}
