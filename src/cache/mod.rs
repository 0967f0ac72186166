//! Result caching.
//!
//! [`ResultCache`] holds result lists under two kinds of keys:
//!
//! - per-provider entries (`scope` = provider id), written after each
//!   successful provider search and by warmup;
//! - global entries (`scope` = [`GLOBAL_SCOPE`]), holding the merged,
//!   ranked list for a full query.
//!
//! Entries expire after their TTL (lazily on read, and in bulk by the
//! background sweeper). Two budgets bound the cache: an entry count and an
//! estimated memory footprint. Both evict in insertion order. Reads do not
//! refresh an entry's position.
//!
//! Large payloads can be trimmed on insert (see [`compress`]): long titles
//! and descriptions are shortened, and the entry is flagged as compressed.

pub mod compress;
mod key;
mod result;
mod warmup;

pub use key::{CacheKey, GLOBAL_SCOPE};
pub use result::{CacheStats, EntryInfo, ResultCache, SweepHandle};
pub use warmup::WarmupReport;

use std::time::Duration;

/// Configuration for the result cache.
///
/// ```rust
/// # use muninn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .default_ttl(Duration::from_secs(120))
///     .compression(false);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries. Default: 1,000.
    pub max_entries: usize,
    /// Budget for the summed size estimate of all entries. Default: 50 MiB.
    pub max_memory_bytes: usize,
    /// TTL used when `set` is called without one. Default: 5 minutes.
    pub default_ttl: Duration,
    /// Period of the background sweep. Default: 60 seconds.
    pub cleanup_interval: Duration,
    /// Whether large payloads are trimmed on insert. Default: on.
    pub compression: bool,
    /// Payload size above which trimming applies. Default: 10 KiB.
    pub compression_threshold_bytes: usize,
    /// Queries searched concurrently per warmup batch. Default: 3.
    pub warmup_batch_size: usize,
    /// Pause between warmup batches. Default: 100 ms.
    pub warmup_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_memory_bytes: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            compression: true,
            compression_threshold_bytes: 10 * 1024,
            warmup_batch_size: 3,
            warmup_delay: Duration::from_millis(100),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn compression_threshold_bytes(mut self, bytes: usize) -> Self {
        self.compression_threshold_bytes = bytes;
        self
    }

    pub fn warmup_batch_size(mut self, n: usize) -> Self {
        self.warmup_batch_size = n;
        self
    }

    pub fn warmup_delay(mut self, delay: Duration) -> Self {
        self.warmup_delay = delay;
        self
    }
}
