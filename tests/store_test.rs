//! Tests for persistence: typed provider state, snapshots and the JSON file
//! store.

use std::sync::Arc;
use std::time::Duration;

use muninn::{
    JsonFileStore, MemoryStore, MuninnError, ProviderSettings, ProviderState, SettingValue, Store,
    UsageSample,
};

fn memory_state() -> ProviderState {
    ProviderState::new(Arc::new(MemoryStore::new()))
}

// ============================================================================
// ProviderState
// ============================================================================

#[tokio::test]
async fn unknown_provider_has_no_state() {
    let state = memory_state();
    assert_eq!(state.enabled_flag("apps").await.unwrap(), None);
    assert_eq!(state.settings("apps").await.unwrap(), None);
    assert_eq!(state.usage("apps").await.unwrap(), None);
    assert!(state.provider_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn usage_accumulates() {
    let state = memory_state();
    state
        .accumulate_usage("apps", Duration::from_millis(10), 3, false)
        .await
        .unwrap();
    let usage = state
        .accumulate_usage("apps", Duration::from_millis(30), 0, true)
        .await
        .unwrap();

    assert_eq!(usage.searches, 2);
    assert_eq!(usage.failures, 1);
    assert_eq!(usage.results, 3);
    assert_eq!(usage.average_elapsed(), Some(Duration::from_millis(20)));
    assert!(usage.last_used.is_some());
    assert_eq!(state.usage("apps").await.unwrap(), Some(usage));
}

#[tokio::test]
async fn usage_batch_accumulates_per_scope() {
    let state = memory_state();
    state
        .accumulate_usage("apps", Duration::from_millis(10), 1, false)
        .await
        .unwrap();

    state
        .accumulate_usage_batch(&[
            UsageSample::new("apps", Duration::from_millis(30), 2, false),
            UsageSample::new("files", Duration::from_millis(5), 0, true),
            UsageSample::new("global", Duration::from_millis(40), 2, false),
        ])
        .await
        .unwrap();

    let apps = state.usage("apps").await.unwrap().unwrap();
    assert_eq!(apps.searches, 2);
    assert_eq!(apps.results, 3);
    assert_eq!(apps.average_elapsed(), Some(Duration::from_millis(20)));
    assert_eq!(state.usage("files").await.unwrap().unwrap().failures, 1);
    assert_eq!(
        state.provider_ids().await.unwrap(),
        ["apps", "files", "global"]
    );

    state.accumulate_usage_batch(&[]).await.unwrap();
    assert_eq!(state.usage("apps").await.unwrap().unwrap().searches, 2);
}

#[tokio::test]
async fn provider_index_tracks_each_id_once() {
    let state = memory_state();
    state.set_enabled_flag("apps", true).await.unwrap();
    state.set_enabled_flag("apps", false).await.unwrap();
    state
        .set_settings("files", &ProviderSettings::new())
        .await
        .unwrap();

    assert_eq!(state.provider_ids().await.unwrap(), ["apps", "files"]);
}

#[tokio::test]
async fn snapshot_round_trips_into_a_fresh_store() {
    let source = memory_state();
    source.set_enabled_flag("apps", false).await.unwrap();
    source
        .set_settings(
            "files",
            &ProviderSettings::new().with("hidden", SettingValue::Bool(true)),
        )
        .await
        .unwrap();
    source
        .accumulate_usage("files", Duration::from_millis(4), 2, false)
        .await
        .unwrap();
    source
        .set_learner_model(serde_json::json!({"providers": {}}))
        .await
        .unwrap();

    let snapshot = source.export_snapshot().await.unwrap();
    assert_eq!(snapshot.providers.len(), 2);
    assert_eq!(snapshot.providers["apps"].enabled, Some(false));

    // Snapshots are plain JSON.
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed = serde_json::from_str(&json).unwrap();

    let target = memory_state();
    target.import_snapshot(&parsed).await.unwrap();

    assert_eq!(target.enabled_flag("apps").await.unwrap(), Some(false));
    assert_eq!(
        target.settings("files").await.unwrap(),
        source.settings("files").await.unwrap()
    );
    assert_eq!(target.usage("files").await.unwrap().unwrap().results, 2);
    assert!(target.learner_model().await.unwrap().is_some());
    assert_eq!(
        target.export_snapshot().await.unwrap().providers,
        snapshot.providers
    );
}

// ============================================================================
// JsonFileStore
// ============================================================================

#[tokio::test]
async fn file_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let first = JsonFileStore::new(&path);
    first.set("answer", serde_json::json!(42)).await.unwrap();
    first
        .set("provider.apps.enabled", serde_json::json!(false))
        .await
        .unwrap();
    assert!(path.exists());

    let second = JsonFileStore::new(&path);
    assert_eq!(second.get("answer").await.unwrap(), Some(serde_json::json!(42)));
    assert_eq!(second.get("missing").await.unwrap(), None);

    let state = ProviderState::new(Arc::new(second));
    assert_eq!(state.enabled_flag("apps").await.unwrap(), Some(false));
}

#[tokio::test]
async fn file_store_writes_through_a_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::new(&path);

    store
        .set_many(vec![
            ("a".to_string(), serde_json::json!(1)),
            ("b".to_string(), serde_json::json!(2)),
        ])
        .await
        .unwrap();

    assert!(!path.with_extension("json.tmp").exists());
    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, serde_json::json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn failed_write_leaves_memory_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    // The state file's parent is a regular file, so every write fails.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let store = JsonFileStore::new(blocker.join("state.json"));

    assert!(matches!(
        store.set("k", serde_json::json!(1)).await,
        Err(MuninnError::Store(_))
    ));
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn failed_write_keeps_previous_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::new(&path);
    store.set("k", serde_json::json!(1)).await.unwrap();

    // A directory squatting on the temp path makes the next write fail.
    std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
    assert!(store.set("k", serde_json::json!(2)).await.is_err());

    assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(1)));
    let reopened = JsonFileStore::new(&path);
    assert_eq!(reopened.get("k").await.unwrap(), Some(serde_json::json!(1)));
}

#[tokio::test]
async fn missing_or_empty_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = JsonFileStore::new(dir.path().join("absent.json"));
    assert_eq!(missing.get("k").await.unwrap(), None);

    let empty_path = dir.path().join("empty.json");
    std::fs::write(&empty_path, "  \n").unwrap();
    let empty = JsonFileStore::new(&empty_path);
    assert_eq!(empty.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn non_object_file_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    let store = JsonFileStore::new(&path);
    let err = store.get("k").await.unwrap_err();

    assert!(matches!(err, MuninnError::Store(ref msg) if msg.contains("array")));
}

#[tokio::test]
async fn corrupt_file_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();

    let store = JsonFileStore::new(&path);
    assert!(matches!(store.get("k").await, Err(MuninnError::Json(_))));
}
