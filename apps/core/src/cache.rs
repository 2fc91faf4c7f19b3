//! Response cache for AI verdicts.
//!
//! Entries are keyed by a hash of the normalized text plus the run language,
//! expire after a TTL and are evicted least-recently-used once the cache is
//! full. A `SharedCache` is process-scoped and guarded by a single mutex;
//! an LRU lookup updates recency, so reads mutate too.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheSettings;
use crate::models::AnalysisResult;

/// Derives the cache key of a normalized comment.
///
/// Never call this with raw text: near-identical comments only share a key
/// after normalization.
pub fn cache_key(normalized_text: &str, language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(language.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized_text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AnalysisResult,
    expires_at: Instant,
}

/// Bounded LRU + TTL cache of analysis results.
pub struct ResponseCache {
    entries: LruCache<String, CacheEntry>,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.max_entries, settings.ttl())
    }

    pub fn get(&mut self, key: &str) -> Option<AnalysisResult> {
        self.get_at(key, Instant::now())
    }

    /// Looks up `key` as of `now`; an expired entry is dropped and reported as a miss.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<AnalysisResult> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                self.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(key);
        }
        self.misses += 1;
        None
    }

    /// Stores `value` for `ttl` (the cache default when `None`).
    ///
    /// At capacity the least-recently-used entry makes room.
    pub fn put(&mut self, key: String, value: AnalysisResult, ttl: Option<Duration>) {
        self.put_at(key, value, ttl, Instant::now());
    }

    pub fn put_at(&mut self, key: String, value: AnalysisResult, ttl: Option<Duration>, now: Instant) {
        let expires_at = now
            .checked_add(ttl.unwrap_or(self.default_ttl))
            .or_else(|| now.checked_add(self.default_ttl))
            .unwrap_or(now);
        if let Some((evicted, _)) = self.entries.push(key.clone(), CacheEntry { value, expires_at }) {
            if evicted != key {
                debug!("Cache full, evicted least-recently-used entry");
            }
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// Cloneable handle to a process-wide [`ResponseCache`].
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<ResponseCache>>,
}

impl SharedCache {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Locks the cache. A poisoned lock still holds consistent entries, since
    /// no operation leaves the map half-updated, so the guard is recovered.
    pub fn lock(&self) -> MutexGuard<'_, ResponseCache> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<AnalysisResult> {
        self.lock().get(key)
    }

    pub fn put(&self, key: String, value: AnalysisResult) {
        self.lock().put(key, value, None);
    }

    pub fn evict_expired(&self) -> usize {
        self.lock().evict_expired()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultSource;

    fn result(id: usize) -> AnalysisResult {
        AnalysisResult::unknown(id, ResultSource::Ai)
    }

    #[test]
    fn test_key_depends_on_language_and_text() {
        let a = cache_key("el servicio es lento", "es");
        assert_eq!(a, cache_key("el servicio es lento", "es"));
        assert_ne!(a, cache_key("el servicio es lento", "en"));
        assert_ne!(a, cache_key("el servicio es rapido", "es"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put("k".into(), result(1), None);

        assert_eq!(cache.get("k"), Some(result(1)));
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put_at("k".into(), result(1), Some(Duration::from_secs(5)), now);

        assert!(cache.get_at("k", now + Duration::from_secs(4)).is_some());
        assert!(cache.get_at("k", now + Duration::from_secs(6)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_when_full() {
        let mut cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.put("a".into(), result(1), None);
        cache.put("b".into(), result(2), None);

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.put("c".into(), result(3), None);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_evict_expired() {
        let now = Instant::now();
        let mut cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put_at("short".into(), result(1), Some(Duration::from_secs(1)), now);
        cache.put_at("long".into(), result(2), Some(Duration::from_secs(100)), now);

        assert_eq!(cache.evict_expired_at(now + Duration::from_secs(2)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at("long", now + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let mut cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put("k".into(), result(1), Some(Duration::MAX));
        assert_eq!(cache.get("k"), Some(result(1)));

        let mut cache = ResponseCache::new(10, Duration::MAX);
        cache.put("k".into(), result(2), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_cache_is_shared_between_clones() {
        let shared = SharedCache::new(ResponseCache::new(10, Duration::from_secs(60)));
        let other = shared.clone();
        shared.put("k".into(), result(7));
        assert_eq!(other.get("k"), Some(result(7)));
    }
}
