//! Tests for the result cache: TTL expiry, the entry and memory budgets,
//! trimming, invalidation, the background sweep and warmup.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use muninn::cache::compress::TRIMMED_TEXT_CHARS;
use muninn::{CacheConfig, CacheKey, MuninnError, ResultCache, ResultItem};

fn items(n: usize) -> Vec<ResultItem> {
    (0..n)
        .map(|i| ResultItem::new(format!("id-{i}"), format!("Item {i}")))
        .collect()
}

fn payload_size(payload: &[ResultItem]) -> usize {
    serde_json::to_vec(payload).unwrap().len()
}

// ============================================================================
// get / set
// ============================================================================

#[tokio::test(start_paused = true)]
async fn entry_is_served_until_ttl_elapses() {
    let cache = ResultCache::new(CacheConfig::new());
    let key = CacheKey::provider("apps", "mail");
    assert!(cache.set(key.clone(), items(2), Some(Duration::from_secs(30))));

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(cache.get(&key), Some(items(2)));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&key), None);
    assert!(cache.is_empty(), "expired entry is removed on read");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expired, 1);
}

#[tokio::test(start_paused = true)]
async fn default_ttl_applies_without_explicit_ttl() {
    let cache = ResultCache::new(CacheConfig::new().default_ttl(Duration::from_secs(5)));
    let key = CacheKey::provider("apps", "mail");
    cache.set(key.clone(), items(1), None);

    assert_eq!(cache.entry_info(&key).unwrap().ttl, Duration::from_secs(5));
    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(!cache.contains(&key));
}

#[test]
fn empty_payload_is_not_stored() {
    let cache = ResultCache::new(CacheConfig::new());
    let key = CacheKey::provider("apps", "nothing");
    assert!(!cache.set(key.clone(), Vec::new(), None));
    assert!(!cache.contains(&key));
}

#[test]
fn keys_are_normalized_and_scoped() {
    let cache = ResultCache::new(CacheConfig::new());
    cache.set(CacheKey::provider("apps", "  Mail "), items(1), None);

    assert!(cache.contains(&CacheKey::provider("apps", "mail")));
    assert!(!cache.contains(&CacheKey::provider("files", "mail")));
    assert!(!cache.contains(&CacheKey::global("mail", 50)));
}

#[test]
fn global_keys_depend_on_the_cap() {
    assert_ne!(CacheKey::global("mail", 10), CacheKey::global("mail", 20));
    assert!(CacheKey::global("mail", 10).is_global());
}

#[test]
fn hits_are_tracked_per_entry() {
    let cache = ResultCache::new(CacheConfig::new());
    let key = CacheKey::provider("apps", "mail");
    cache.set(key.clone(), items(3), None);
    cache.get(&key);
    cache.get(&key);

    let info = cache.entry_info(&key).unwrap();
    assert_eq!(info.hits, 2);
    assert_eq!(info.items, 3);
    assert!(!info.compressed);
}

// ============================================================================
// Budgets
// ============================================================================

#[test]
fn entry_count_never_exceeds_max() {
    let cache = ResultCache::new(CacheConfig::new().max_entries(3));
    for i in 0..10 {
        cache.set(CacheKey::provider("apps", &format!("q{i}")), items(1), None);
        assert!(cache.len() <= 3);
    }

    // Oldest insertions are evicted first.
    assert!(!cache.contains(&CacheKey::provider("apps", "q6")));
    for i in 7..10 {
        assert!(cache.contains(&CacheKey::provider("apps", &format!("q{i}"))));
    }
    assert_eq!(cache.stats().evictions, 7);
}

#[test]
fn zero_capacity_reports_entry_not_stored() {
    let cache = ResultCache::new(CacheConfig::new().max_entries(0));

    assert!(!cache.set(CacheKey::provider("apps", "mail"), items(1), None));
    assert!(cache.is_empty());
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn memory_budget_evicts_oldest() {
    let size = payload_size(&items(4));
    let cache = ResultCache::new(
        CacheConfig::new()
            .max_memory_bytes(size * 2 + size / 2)
            .compression(false),
    );
    let keys: Vec<_> = (0..3).map(|i| CacheKey::provider("apps", &format!("q{i}"))).collect();
    for key in &keys {
        assert!(cache.set(key.clone(), items(4), None));
    }

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&keys[0]));
    assert!(cache.contains(&keys[1]) && cache.contains(&keys[2]));
    assert_eq!(cache.stats().memory_bytes, size * 2);
}

#[tokio::test(start_paused = true)]
async fn memory_pressure_clears_expired_before_evicting() {
    let size = payload_size(&items(4));
    let cache = ResultCache::new(
        CacheConfig::new()
            .max_memory_bytes(size * 2 + size / 2)
            .compression(false),
    );
    let short = CacheKey::provider("apps", "short");
    let long = CacheKey::provider("apps", "long");
    cache.set(short.clone(), items(4), Some(Duration::from_secs(1)));
    cache.set(long.clone(), items(4), Some(Duration::from_secs(600)));

    tokio::time::advance(Duration::from_secs(2)).await;
    cache.set(CacheKey::provider("apps", "new"), items(4), None);

    assert!(cache.contains(&long), "live entry survives when expired space suffices");
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.stats().expired, 1);
}

#[test]
fn payload_larger_than_budget_is_rejected() {
    let cache = ResultCache::new(CacheConfig::new().max_memory_bytes(16).compression(false));
    assert!(!cache.set(CacheKey::provider("apps", "big"), items(5), None));
    assert!(cache.is_empty());
}

// ============================================================================
// Trimming
// ============================================================================

#[test]
fn large_payload_is_trimmed_and_flagged() {
    let cache = ResultCache::new(CacheConfig::new().compression_threshold_bytes(256));
    let long_text = "x".repeat(500);
    let payload = vec![
        ResultItem::new("doc", long_text.clone()).with_description(long_text),
    ];
    let key = CacheKey::provider("files", "doc");
    assert!(cache.set(key.clone(), payload, None));

    let info = cache.entry_info(&key).unwrap();
    assert!(info.compressed);
    let stored = cache.get(&key).unwrap();
    assert_eq!(stored[0].title.chars().count(), TRIMMED_TEXT_CHARS);
    assert!(stored[0].title.ends_with("..."));
    assert_eq!(stored[0].id, "doc");
}

#[test]
fn trimming_can_be_disabled() {
    let cache = ResultCache::new(
        CacheConfig::new()
            .compression(false)
            .compression_threshold_bytes(16),
    );
    let key = CacheKey::provider("files", "doc");
    cache.set(key.clone(), vec![ResultItem::new("doc", "y".repeat(300))], None);

    assert!(!cache.entry_info(&key).unwrap().compressed);
    assert_eq!(cache.get(&key).unwrap()[0].title.len(), 300);
}

// ============================================================================
// Invalidation
// ============================================================================

#[test]
fn invalidate_provider_removes_only_that_scope() {
    let cache = ResultCache::new(CacheConfig::new());
    cache.set(CacheKey::provider("apps", "a"), items(1), None);
    cache.set(CacheKey::provider("apps", "b"), items(1), None);
    cache.set(CacheKey::provider("files", "a"), items(1), None);
    cache.set(CacheKey::global("a", 50), items(1), None);

    assert_eq!(cache.invalidate_provider("apps"), 2);

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&CacheKey::provider("files", "a")));
    assert!(cache.contains(&CacheKey::global("a", 50)));
}

#[test]
fn clear_keeps_counters() {
    let cache = ResultCache::new(CacheConfig::new());
    let key = CacheKey::provider("apps", "a");
    cache.set(key.clone(), items(1), None);
    cache.get(&key);
    cache.clear();

    let stats = cache.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.memory_bytes, 0);
    assert_eq!(stats.hits, 1);
    assert!(stats.oldest.is_none());
}

// ============================================================================
// Sweep
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sweeper_removes_expired_entries() {
    let cache = Arc::new(ResultCache::new(
        CacheConfig::new().cleanup_interval(Duration::from_secs(10)),
    ));
    let handle = cache.spawn_sweeper();
    cache.set(CacheKey::provider("apps", "a"), items(1), Some(Duration::from_secs(1)));
    cache.set(CacheKey::provider("apps", "b"), items(1), Some(Duration::from_secs(60)));

    tokio::time::sleep(Duration::from_secs(11)).await;

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.expired, 1);
    assert!(stats.cleanups >= 1);
    assert!(!handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_sweep() {
    let cache = Arc::new(ResultCache::new(
        CacheConfig::new().cleanup_interval(Duration::from_secs(1)),
    ));
    drop(cache.spawn_sweeper());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.stats().cleanups, 0);
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stats_report_hit_rate_and_age_bounds() {
    let cache = ResultCache::new(CacheConfig::new());
    let first = CacheKey::provider("apps", "first");
    cache.set(first.clone(), items(1), None);
    tokio::time::advance(Duration::from_secs(3)).await;
    cache.set(CacheKey::provider("apps", "second"), items(2), None);

    cache.get(&first);
    cache.get(&first);
    cache.get(&first);
    cache.get(&CacheKey::provider("apps", "missing"));

    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    assert_eq!(stats.memory_bytes, payload_size(&items(1)) + payload_size(&items(2)));
    let (oldest, newest) = (stats.oldest.unwrap(), stats.newest.unwrap());
    assert_eq!(newest - oldest, Duration::from_secs(3));
}

// ============================================================================
// Warmup
// ============================================================================

#[tokio::test(start_paused = true)]
async fn warmup_populates_cache_and_tolerates_failures() {
    let cache = ResultCache::new(
        CacheConfig::new()
            .warmup_batch_size(2)
            .warmup_delay(Duration::from_millis(100)),
    );
    let queries: Vec<String> = ["mail", "maps", "broken", "empty", "music"]
        .into_iter()
        .map(String::from)
        .collect();
    let calls = AtomicUsize::new(0);

    let started = tokio::time::Instant::now();
    let report = cache
        .warmup("apps", &queries, |query| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match query.as_str() {
                    "broken" => Err(MuninnError::provider("apps", "index unavailable")),
                    "empty" => Ok(Vec::new()),
                    _ => Ok(vec![ResultItem::new(query.clone(), query)]),
                }
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.cached, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    // Three batches, two pauses between them.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));
    assert!(cache.contains(&CacheKey::provider("apps", "music")));
    assert!(!cache.contains(&CacheKey::provider("apps", "broken")));
}

#[tokio::test]
async fn warmup_skips_cached_and_blank_queries() {
    let cache = ResultCache::new(CacheConfig::new().warmup_delay(Duration::ZERO));
    cache.set(CacheKey::provider("apps", "mail"), items(1), None);
    let queries = vec!["mail".to_string(), "  ".to_string(), "maps".to_string()];

    let report = cache
        .warmup("apps", &queries, |query| async move {
            Ok(vec![ResultItem::new(query.clone(), query)])
        })
        .await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.cached, 1);
    assert_eq!(report.skipped, 2);
}
