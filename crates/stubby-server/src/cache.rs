//! Match cache: request fingerprint to previously matched lifecycle.
//!
//! The cache stores the index of a matched lifecycle together with the
//! snapshot generation it was matched against, so entries written while a
//! mutation is in flight can never be served against the new list.

use crate::predicate::CaptureGroups;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Configuration for the match cache
#[derive(Clone, Debug)]
pub struct MatchCacheConfig {
    /// Use a real cache; `false` selects [`NoOpMatchCache`]
    pub enabled: bool,
    /// Maximum number of entries (least recently used evicted when exceeded)
    pub max_size: usize,
    /// TTL for entries in seconds (0 = no expiration)
    pub ttl_seconds: u64,
}

impl Default for MatchCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 500,
            ttl_seconds: 3600,
        }
    }
}

/// What a cache hit hands back to the repository.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedMatch {
    /// Snapshot generation the match was computed against
    pub generation: u64,
    pub index: usize,
    pub captures: CaptureGroups,
}

/// Counters for cache behaviour
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub size: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fingerprint-keyed store of match results.
pub trait MatchCache: Send + Sync {
    fn get(&self, fingerprint: u64) -> Option<CachedMatch>;

    fn put(&self, fingerprint: u64, matched: CachedMatch);

    /// Drop every entry.
    fn invalidate_all(&self);

    fn metrics(&self) -> CacheMetrics;
}

/// Build the cache selected by `config`.
pub fn create_match_cache(config: &MatchCacheConfig) -> Arc<dyn MatchCache> {
    if config.enabled {
        Arc::new(TtlMatchCache::new(config.clone()))
    } else {
        debug!("Match cache disabled, every request re-scans the stub list");
        Arc::new(NoOpMatchCache)
    }
}

// ============================================================================
// TTL cache
// ============================================================================

#[derive(Debug)]
struct CacheEntry {
    matched: CachedMatch,
    created_at: Instant,
    /// Nanoseconds since the cache epoch, bumped on every hit
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn new(matched: CachedMatch, stamp: u64) -> Self {
        Self {
            matched,
            created_at: Instant::now(),
            last_accessed: AtomicU64::new(stamp),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        self.created_at.elapsed() > ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

/// Bounded cache with time-to-live expiry.
///
/// Hits only take the read lock; access stamps and counters are atomics.
pub struct TtlMatchCache {
    config: MatchCacheConfig,
    epoch: Instant,
    entries: RwLock<HashMap<u64, CacheEntry>>,
    counters: Counters,
}

impl TtlMatchCache {
    pub fn new(config: MatchCacheConfig) -> Self {
        debug!(
            "Creating match cache: max_size={}, ttl={}s",
            config.max_size, config.ttl_seconds
        );
        Self {
            config,
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_seconds)
    }

    fn stamp(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn evict_lru(&self, entries: &mut HashMap<u64, CacheEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            entries.remove(&key);
            bump(&self.counters.evictions, 1);
            trace!("Evicted LRU match cache entry {:x}", key);
        }
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        let ttl = self.ttl();
        if ttl.is_zero() {
            return;
        }

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cleaned up {} expired match cache entries", removed);
            bump(&self.counters.expirations, removed as u64);
        }
    }

    pub fn size(&self) -> usize {
        self.entries.read().len()
    }
}

impl MatchCache for TtlMatchCache {
    fn get(&self, fingerprint: u64) -> Option<CachedMatch> {
        let ttl = self.ttl();

        let expired = {
            let entries = self.entries.read();
            match entries.get(&fingerprint) {
                Some(entry) if entry.is_expired(ttl) => true,
                Some(entry) => {
                    entry.last_accessed.store(self.stamp(), Ordering::Relaxed);
                    bump(&self.counters.hits, 1);
                    trace!("Match cache hit for {:x}", fingerprint);
                    return Some(entry.matched.clone());
                }
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write();
            // Another reader may have replaced or removed it meanwhile.
            if entries.get(&fingerprint).is_some_and(|e| e.is_expired(ttl)) {
                trace!("Match cache entry expired for {:x}", fingerprint);
                entries.remove(&fingerprint);
                bump(&self.counters.expirations, 1);
            }
        }
        bump(&self.counters.misses, 1);
        None
    }

    fn put(&self, fingerprint: u64, matched: CachedMatch) {
        if self.config.max_size == 0 {
            return;
        }
        let stamp = self.stamp();
        let mut entries = self.entries.write();
        if entries.len() >= self.config.max_size && !entries.contains_key(&fingerprint) {
            self.evict_lru(&mut entries);
        }
        entries.insert(fingerprint, CacheEntry::new(matched, stamp));
        bump(&self.counters.inserts, 1);
    }

    fn invalidate_all(&self) {
        self.entries.write().clear();
        bump(&self.counters.invalidations, 1);
        trace!("Match cache invalidated");
    }

    fn metrics(&self) -> CacheMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheMetrics {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            inserts: load(&self.counters.inserts),
            evictions: load(&self.counters.evictions),
            expirations: load(&self.counters.expirations),
            invalidations: load(&self.counters.invalidations),
            size: self.size(),
        }
    }
}

// ============================================================================
// No-op cache
// ============================================================================

/// Cache that never stores anything, so every lookup re-scans.
#[derive(Debug, Default)]
pub struct NoOpMatchCache;

impl MatchCache for NoOpMatchCache {
    fn get(&self, _fingerprint: u64) -> Option<CachedMatch> {
        None
    }

    fn put(&self, _fingerprint: u64, _matched: CachedMatch) {}

    fn invalidate_all(&self) {}

    fn metrics(&self) -> CacheMetrics {
        CacheMetrics::default()
    }
}
