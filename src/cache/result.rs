//! The result cache proper.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::compress::{estimate_size, trim_payload};
use super::{CacheConfig, CacheKey};
use crate::telemetry;
use crate::types::ResultItem;

struct CacheEntry {
    payload: Vec<ResultItem>,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
    last_access: Instant,
    size_bytes: usize,
    compressed: bool,
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Insertion sequence → key. The first element is the eviction candidate.
    order: BTreeMap<u64, CacheKey>,
    memory_bytes: usize,
    next_seq: u64,
}

impl CacheInner {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes);
        }
        true
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub hit_rate: f64,
    pub memory_bytes: usize,
    pub expired: u64,
    pub evictions: u64,
    pub cleanups: u64,
    pub oldest: Option<Instant>,
    pub newest: Option<Instant>,
}

/// Metadata of a single live entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub hits: u64,
    pub ttl: Duration,
    pub age: Duration,
    pub idle: Duration,
    pub size_bytes: usize,
    pub compressed: bool,
    pub items: usize,
}

/// In-memory result cache. See the [module docs](super) for the model.
pub struct ResultCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    cleanups: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry.
    ///
    /// An expired entry is removed and reported as a miss. Emits hit/miss
    /// metrics labelled by scope.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<ResultItem>> {
        let now = Instant::now();
        let found = {
            let mut inner = self.inner.lock();
            match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
                Some(false) => inner.entries.get_mut(key).map(|entry| {
                    entry.hits += 1;
                    entry.last_access = now;
                    entry.payload.clone()
                }),
                Some(true) => {
                    inner.remove(key);
                    self.expired.fetch_add(1, Ordering::Relaxed);
                    None
                }
                None => None,
            }
        };

        let scope = key.scope_label();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "scope" => scope).increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "scope" => scope).increment(1);
        }
        found
    }

    /// Store `payload` under `key`, replacing any previous entry.
    ///
    /// `ttl` defaults to [`CacheConfig::default_ttl`]. Returns whether the
    /// payload was stored: empty payloads, payloads that fail to serialize
    /// and payloads larger than the whole memory budget are not, nor is an
    /// entry evicted straight away because the cache holds no entries.
    pub fn set(&self, key: CacheKey, mut payload: Vec<ResultItem>, ttl: Option<Duration>) -> bool {
        if payload.is_empty() {
            return false;
        }
        let mut size_bytes = match estimate_size(&payload) {
            Ok(size) => size,
            Err(e) => {
                debug!(key = %key, error = %e, "payload not serializable, skipping cache insert");
                return false;
            }
        };

        let mut compressed = false;
        if self.config.compression && size_bytes > self.config.compression_threshold_bytes {
            trim_payload(&mut payload);
            compressed = true;
            size_bytes = estimate_size(&payload).unwrap_or(size_bytes);
        }

        if size_bytes > self.config.max_memory_bytes {
            debug!(key = %key, size_bytes, "payload exceeds memory budget, skipping cache insert");
            return false;
        }

        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut evicted = 0u64;
        let mut inner = self.inner.lock();

        inner.remove(&key);

        if inner.memory_bytes + size_bytes > self.config.max_memory_bytes {
            let purged = inner.purge_expired(now);
            self.expired.fetch_add(purged as u64, Ordering::Relaxed);
            while inner.memory_bytes + size_bytes > self.config.max_memory_bytes
                && inner.evict_oldest()
            {
                evicted += 1;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.memory_bytes += size_bytes;
        inner.entries.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
                ttl,
                hits: 0,
                last_access: now,
                size_bytes,
                compressed,
                seq,
            },
        );

        while inner.entries.len() > self.config.max_entries && inner.evict_oldest() {
            evicted += 1;
        }
        let stored = inner.order.contains_key(&seq);
        drop(inner);

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(evicted);
        }
        stored
    }

    /// Whether a live (unexpired) entry exists. Does not count as a lookup.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Metadata of a live entry.
    pub fn entry_info(&self, key: &CacheKey) -> Option<EntryInfo> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let entry = inner.entries.get(key).filter(|e| !e.is_expired(now))?;
        Some(EntryInfo {
            hits: entry.hits,
            ttl: entry.ttl,
            age: now.saturating_duration_since(entry.created_at),
            idle: now.saturating_duration_since(entry.last_access),
            size_bytes: entry.size_bytes,
            compressed: entry.compressed,
            items: entry.payload.len(),
        })
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every entry scoped to `scope` (a provider id, or
    /// [`GLOBAL_SCOPE`](super::GLOBAL_SCOPE)). Returns the number removed.
    pub fn invalidate_provider(&self, scope: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|key| key.scope() == scope)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            debug!(scope, removed = keys.len(), "invalidated cache entries");
        }
        keys.len()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.memory_bytes = 0;
    }

    /// Remove all expired entries now. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.inner.lock().purge_expired(Instant::now());
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes, oldest, newest) = {
            let inner = self.inner.lock();
            let oldest = inner.entries.values().map(|e| e.created_at).min();
            let newest = inner.entries.values().map(|e| e.created_at).max();
            (inner.entries.len(), inner.memory_bytes, oldest, newest)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            memory_bytes,
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
            oldest,
            newest,
        }
    }

    /// One sweeper pass.
    fn sweep(&self) {
        let removed = self.purge_expired();
        self.cleanups.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
    }

    /// Start the periodic expiry sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference: it stops on its own once the
    /// cache is dropped, and is aborted when the returned handle is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweepHandle {
        let cache = Arc::downgrade(self);
        let period = self.config.cleanup_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.sweep();
            }
        });
        SweepHandle { task }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish()
    }
}

/// Owns the background sweep task. Dropping it stops the sweep.
#[derive(Debug)]
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
