//! Tests for query dispatch: routing, fan-out, failure isolation, merging
//! and the global result cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use muninn::{
    Broker, BrokerEvent, DispatchConfig, Muninn, MuninnError, QueryContext, Result, ResultItem,
    SearchProvider,
};

// ============================================================================
// Mock providers
// ============================================================================

#[derive(Clone)]
enum Behavior {
    Items(Vec<ResultItem>),
    Fail,
    Panic,
    Hang,
}

struct MockProvider {
    id: &'static str,
    prefixes: Vec<String>,
    behavior: Behavior,
    fail_init_times: AtomicUsize,
    hang_init: bool,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<QueryContext>>>,
}

impl MockProvider {
    fn new(id: &'static str, behavior: Behavior) -> Self {
        Self {
            id,
            prefixes: Vec::new(),
            behavior,
            fail_init_times: AtomicUsize::new(0),
            hang_init: false,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn items(id: &'static str, items: Vec<ResultItem>) -> Self {
        Self::new(id, Behavior::Items(items))
    }

    fn prefix(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.to_string());
        self
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.id
    }

    fn search_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    async fn initialize(&self) -> Result<()> {
        let remaining = self.fail_init_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_init_times.store(remaining - 1, Ordering::SeqCst);
            return Err(MuninnError::provider(self.id, "not ready"));
        }
        if self.hang_init {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn search(&self, context: &QueryContext) -> Result<Vec<ResultItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(context.clone());
        match &self.behavior {
            Behavior::Items(items) => Ok(items.clone()),
            Behavior::Fail => Err(MuninnError::provider(self.id, "index unavailable")),
            Behavior::Panic => panic!("provider bug"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn broker() -> Broker {
    Muninn::builder().sweeper(false).build().unwrap()
}

fn item(id: &str, title: &str, priority: f64) -> ResultItem {
    ResultItem::new(id, title).with_priority(priority)
}

fn ids(results: &[ResultItem]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn prefix_routes_to_claiming_provider_only() {
    let broker = broker();
    let apps = MockProvider::items("apps", vec![item("calc", "Calculator", 1.0)]).prefix("app:");
    let files = MockProvider::items("files", vec![item("calc.txt", "calc.txt", 0.5)]);
    let (apps_seen, files_calls) = (Arc::clone(&apps.seen), Arc::clone(&files.calls));
    broker.register(Arc::new(apps)).await.unwrap();
    broker.register(Arc::new(files)).await.unwrap();

    let results = broker.search("app:calc").await;

    assert_eq!(ids(&results), ["calc"]);
    assert_eq!(files_calls.load(Ordering::SeqCst), 0);
    let seen = apps_seen.lock();
    assert_eq!(seen[0].raw(), "calc");
    assert_eq!(seen[0].prefix(), Some("app:"));
}

#[tokio::test]
async fn unprefixed_query_reaches_every_provider_unchanged() {
    let broker = broker();
    let apps = MockProvider::items("apps", vec![item("calc", "Calculator", 1.0)]).prefix("app:");
    let files = MockProvider::items("files", vec![item("calc.txt", "calc.txt", 0.5)]);
    let (apps_seen, files_seen) = (Arc::clone(&apps.seen), Arc::clone(&files.seen));
    broker.register(Arc::new(apps)).await.unwrap();
    broker.register(Arc::new(files)).await.unwrap();

    let results = broker.search("calc").await;

    assert_eq!(ids(&results), ["calc", "calc.txt"]);
    assert_eq!(apps_seen.lock()[0].raw(), "calc");
    assert_eq!(files_seen.lock()[0].raw(), "calc");
    assert_eq!(files_seen.lock()[0].prefix(), None);
}

#[tokio::test]
async fn prefix_match_is_case_insensitive() {
    let broker = broker();
    let apps = MockProvider::items("apps", vec![item("term", "Terminal", 1.0)]).prefix("app:");
    let seen = Arc::clone(&apps.seen);
    broker.register(Arc::new(apps)).await.unwrap();

    broker.search("APP:term").await;

    assert_eq!(seen.lock()[0].raw(), "term");
}

#[tokio::test]
async fn disabled_providers_are_not_queried() {
    let broker = broker();
    let apps = MockProvider::items("apps", vec![item("mail", "Mail", 1.0)]);
    let calls = Arc::clone(&apps.calls);
    broker.register(Arc::new(apps)).await.unwrap();
    broker.disable("apps").await.unwrap();

    assert!(broker.search("mail").await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn failing_provider_is_isolated() {
    let broker = broker();
    let calc = MockProvider::items("calc", vec![item("calc:4", "4", 10.0)]);
    let files = MockProvider::new("files", Behavior::Fail);
    broker.register(Arc::new(calc)).await.unwrap();
    broker.register(Arc::new(files)).await.unwrap();

    let results = broker.search("2+2").await;

    assert_eq!(ids(&results), ["calc:4"]);
    assert_eq!(results[0].provider_id, "calc");
    assert_eq!(broker.provider_health("files").unwrap().errors, 1);
    assert_eq!(broker.provider_health("calc").unwrap().errors, 0);
}

#[tokio::test]
async fn panicking_provider_is_isolated() {
    let broker = broker();
    broker
        .register(Arc::new(MockProvider::items("apps", vec![item("a", "Alpha", 1.0)])))
        .await
        .unwrap();
    broker
        .register(Arc::new(MockProvider::new("buggy", Behavior::Panic)))
        .await
        .unwrap();

    let results = broker.search("alpha").await;

    assert_eq!(ids(&results), ["a"]);
    assert_eq!(broker.provider_health("buggy").unwrap().errors, 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_provider_times_out() {
    let broker = Muninn::builder()
        .sweeper(false)
        .dispatch(DispatchConfig::new().provider_timeout(Duration::from_secs(3)))
        .build()
        .unwrap();
    broker
        .register(Arc::new(MockProvider::items("apps", vec![item("a", "Alpha", 1.0)])))
        .await
        .unwrap();
    broker
        .register(Arc::new(MockProvider::new("slow", Behavior::Hang)))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let results = broker.search("alpha").await;

    assert_eq!(ids(&results), ["a"]);
    assert!(started.elapsed() < Duration::from_secs(60));
    let health = broker.provider_health("slow").unwrap();
    assert_eq!(health.timeouts, 1);
    assert_eq!(health.errors, 1);
}

#[tokio::test]
async fn failed_initialize_is_retried_on_search() {
    let broker = broker();
    let provider = MockProvider::items("apps", vec![item("mail", "Mail", 1.0)]);
    provider.fail_init_times.store(2, Ordering::SeqCst);
    let calls = Arc::clone(&provider.calls);
    broker.register(Arc::new(provider)).await.unwrap();

    // Registration consumed one failure, the first search consumes the other.
    assert!(broker.search("mail").await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let results = broker.search("mail again").await;
    assert_eq!(ids(&results), ["mail"]);
    assert_eq!(broker.provider_health("apps").unwrap().errors, 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_lazy_initialize_times_out_without_blocking_others() {
    let broker = Muninn::builder()
        .sweeper(false)
        .dispatch(DispatchConfig::new().provider_timeout(Duration::from_secs(3)))
        .build()
        .unwrap();
    let mut stuck = MockProvider::items("stuck", vec![item("never", "Never", 1.0)]);
    stuck.fail_init_times.store(1, Ordering::SeqCst);
    stuck.hang_init = true;
    let stuck_calls = Arc::clone(&stuck.calls);
    broker.register(Arc::new(stuck)).await.unwrap();
    broker
        .register(Arc::new(MockProvider::items("apps", vec![item("alpha", "Alpha", 1.0)])))
        .await
        .unwrap();

    let results = tokio::time::timeout(Duration::from_secs(60), broker.search("alpha"))
        .await
        .expect("dispatch finished within the provider timeout");

    assert_eq!(ids(&results), ["alpha"]);
    assert_eq!(stuck_calls.load(Ordering::SeqCst), 0);
    let health = broker.provider_health("stuck").unwrap();
    assert_eq!(health.timeouts, 1);
    // One failed eager initialize plus the timed-out retry.
    assert_eq!(health.errors, 2);

    // The lifecycle lock is released, so unregistering does not hang.
    tokio::time::timeout(Duration::from_secs(1), broker.unregister("stuck"))
        .await
        .expect("unregister finished")
        .unwrap();
}

#[tokio::test]
async fn failures_are_recorded_in_usage_metrics() {
    let broker = broker();
    broker
        .register(Arc::new(MockProvider::new("files", Behavior::Fail)))
        .await
        .unwrap();

    broker.search("report").await;

    let usage = broker.state().usage("files").await.unwrap().unwrap();
    assert_eq!(usage.searches, 1);
    assert_eq!(usage.failures, 1);
    assert_eq!(usage.results, 0);
}

// ============================================================================
// Merging
// ============================================================================

#[tokio::test]
async fn duplicates_keep_highest_priority() {
    let broker = broker();
    broker
        .register(Arc::new(MockProvider::items(
            "apps",
            vec![item("firefox", "Firefox", 2.0), item("files", "Files", 1.0)],
        )))
        .await
        .unwrap();
    broker
        .register(Arc::new(MockProvider::items(
            "recent",
            vec![item("firefox", "Firefox (recent)", 5.0)],
        )))
        .await
        .unwrap();

    let results = broker.search("f").await;

    assert_eq!(ids(&results), ["firefox", "files"]);
    assert_eq!(results[0].title, "Firefox (recent)");
    assert_eq!(results[0].provider_id, "recent");
}

#[tokio::test]
async fn order_is_priority_then_title() {
    let broker = broker();
    broker
        .register(Arc::new(MockProvider::items(
            "a",
            vec![item("1", "Zulu", 1.0), item("2", "Alpha", 1.0)],
        )))
        .await
        .unwrap();
    broker
        .register(Arc::new(MockProvider::items("b", vec![item("3", "Mike", 3.0)])))
        .await
        .unwrap();

    let results = broker.search("x").await;

    assert_eq!(ids(&results), ["3", "2", "1"]);
}

#[tokio::test]
async fn results_are_truncated_to_limit() {
    let broker = broker();
    let items = (0..10).map(|i| item(&format!("i{i}"), &format!("Item {i}"), i as f64)).collect();
    broker
        .register(Arc::new(MockProvider::items("many", items)))
        .await
        .unwrap();

    let results = broker.search_with_limit("item", 3).await;

    assert_eq!(ids(&results), ["i9", "i8", "i7"]);
}

// ============================================================================
// Blank queries and the global cache
// ============================================================================

#[tokio::test]
async fn blank_query_returns_nothing_and_emits_nothing() {
    let broker = broker();
    let provider = MockProvider::items("apps", vec![item("a", "A", 1.0)]);
    let calls = Arc::clone(&provider.calls);
    broker.register(Arc::new(provider)).await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    broker.subscribe(move |e| sink.lock().push(e.kind()));

    assert!(broker.search("   ").await.is_empty());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(events.lock().is_empty());
    assert_eq!(broker.cache_stats().misses, 0);
}

#[tokio::test]
async fn repeated_query_is_served_from_global_cache() {
    let broker = broker();
    let provider = MockProvider::items("apps", vec![item("mail", "Mail", 1.0)]);
    let calls = Arc::clone(&provider.calls);
    broker.register(Arc::new(provider)).await.unwrap();

    let first = broker.search("mail").await;
    let second = broker.search("  MAIL ").await;

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // A cache hit is still a search as far as the learner is concerned.
    assert_eq!(broker.learner().usage("apps", "mail").unwrap().frequency, 2);
}

#[tokio::test]
async fn different_limit_misses_global_cache_but_hits_provider_cache() {
    let broker = broker();
    let provider = MockProvider::items("apps", vec![item("mail", "Mail", 1.0)]);
    let calls = Arc::clone(&provider.calls);
    broker.register(Arc::new(provider)).await.unwrap();

    broker.search_with_limit("mail", 5).await;
    let results = broker.search_with_limit("mail", 10).await;

    assert_eq!(ids(&results), ["mail"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn search_emits_lifecycle_events_in_order() {
    let broker = broker();
    broker
        .register(Arc::new(MockProvider::items("apps", vec![item("mail", "Mail", 1.0)])))
        .await
        .unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    broker.subscribe(move |e| sink.lock().push(e.clone()));

    broker.search("mail").await;

    let events = events.lock();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], BrokerEvent::SearchStarted { query } if query == "mail"));
    assert!(matches!(&events[1], BrokerEvent::ResultsReady { results, .. } if results.len() == 1));
    assert!(matches!(&events[2], BrokerEvent::SearchEnded { result_count: 1, .. }));
}

#[tokio::test]
async fn no_providers_yields_empty_list() {
    let broker = broker();
    assert!(broker.search("anything").await.is_empty());
}
