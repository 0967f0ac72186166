//! JSON-file backed [`Store`].

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::Store;
use crate::{MuninnError, Result};

/// Persists the whole key-value map as one pretty-printed JSON object.
///
/// The file is read lazily on first access and rewritten on every `set`
/// (or once per `set_many`). Disk I/O runs on the blocking pool. Writes go
/// to a sibling temp file that is renamed over the state file, so a crash
/// mid-write leaves the previous contents intact. The in-memory copy only
/// changes after the write succeeds.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// `<data dir>/muninn/state.json`, or `~/.muninn/state.json` when the
    /// platform has no data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("muninn").join("state.json"))
            .or_else(|| dirs::home_dir().map(|home| home.join(".muninn").join("state.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `entries` on top of the current map and persist the result.
    async fn commit(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let mut next = match guard.as_ref() {
            Some(current) => current.clone(),
            None => self.blocking(load).await?,
        };
        next.extend(entries);

        let next = self
            .blocking(move |path| write_atomic(path, &next).map(|()| next))
            .await?;
        *guard = Some(next);
        Ok(())
    }

    /// Run `op` against the state file on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || op(&path))
            .await
            .map_err(|e| MuninnError::Store(format!("state file task failed: {e}")))?
    }
}

fn load(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| MuninnError::Store(format!("failed to read {path:?}: {e}")))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        other => Err(MuninnError::Store(format!(
            "{path:?} does not contain a JSON object (found {})",
            json_type(&other)
        ))),
    }
}

/// Write to `<path>.tmp`, then rename over `path`.
fn write_atomic(path: &Path, entries: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| MuninnError::Store(format!("failed to create {parent:?}: {e}")))?;
    }
    let bytes = serde_json::to_vec_pretty(entries)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, bytes)
        .map_err(|e| MuninnError::Store(format!("failed to write {tmp_path:?}: {e}")))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        MuninnError::Store(format!("failed to rename {tmp_path:?} to {path:?}: {e}"))
    })?;
    debug!(path = %path.display(), keys = entries.len(), "state file written");
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.blocking(load).await?);
        }
        Ok(guard.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.commit(vec![(key.to_string(), value)]).await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.commit(entries).await
    }
}
