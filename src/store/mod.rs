//! Storage-agnostic persistence.
//!
//! The broker persists three kinds of state between process lifetimes:
//! per-provider enabled flags and settings, per-provider usage metrics, and
//! the usage learner's model. All of it goes through the minimal [`Store`]
//! capability, a key-value map over JSON values, so the concrete medium
//! (a file, a browser key-value API, a database) is an external choice.
//!
//! - [`MemoryStore`]: process-local, used by default and in tests.
//! - [`JsonFileStore`]: a single JSON document on disk.
//! - [`ProviderState`]: typed accessors and snapshot export/import layered
//!   over any `Store`.

mod file;
mod state;

pub use file::JsonFileStore;
pub use state::{ProviderSnapshot, ProviderState, StateSnapshot, UsageMetrics, UsageSample};

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;

/// Minimal key-value persistence capability.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value. `Ok(None)` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Write (or overwrite) a value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Write several values. Stores that persist as a whole override this
    /// to commit them in one write.
    async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value).await?;
        }
        Ok(())
    }
}

/// In-memory [`Store`]. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, serde_json::Value)>) -> Result<()> {
        self.entries.lock().extend(entries);
        Ok(())
    }
}
