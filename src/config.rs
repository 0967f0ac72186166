//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)
//!
//! Every section is optional; missing values take the same defaults as the
//! builder configs ([`CacheConfig`], [`LearnerConfig`], [`DispatchConfig`]).
//!
//! ```toml
//! [dispatch]
//! max_results = 20
//! provider_timeout_ms = 2000
//!
//! [cache]
//! max_entries = 500
//! default_ttl_secs = 120
//!
//! [[providers]]
//! id = "apps"
//! name = "Applications"
//! prefixes = ["app:"]
//! items = [{ id = "mail", title = "Mail", description = "Read email" }]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::broker::{Muninn, MuninnBuilder};
use crate::cache::CacheConfig;
use crate::dispatch::DispatchConfig;
use crate::learner::LearnerConfig;
use crate::providers::StaticProvider;
use crate::types::ResultItem;
use crate::{MuninnError, Result};

/// Broker configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub learner: LearnerSection,
    #[serde(default)]
    pub state: StateSection,
    /// Static providers to register at startup.
    #[serde(default)]
    pub providers: Vec<StaticProviderConfig>,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Result cap when the caller gives none (default: 50).
    pub max_results: usize,
    /// Per-provider search timeout in milliseconds (default: 3000).
    pub provider_timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            max_results: defaults.max_results,
            provider_timeout_ms: defaults.provider_timeout.as_millis() as u64,
        }
    }
}

impl From<&DispatchSection> for DispatchConfig {
    fn from(section: &DispatchSection) -> Self {
        DispatchConfig::new()
            .max_results(section.max_results)
            .provider_timeout(Duration::from_millis(section.provider_timeout_ms))
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Maximum entries (default: 1000).
    pub max_entries: usize,
    /// Memory budget in megabytes (default: 50).
    pub max_memory_mb: usize,
    /// Default entry TTL in seconds (default: 300).
    pub default_ttl_secs: u64,
    /// Expiry sweep period in seconds (default: 60).
    pub cleanup_interval_secs: u64,
    /// Trim large payloads (default: true).
    pub compression: bool,
    /// Trim threshold in kilobytes (default: 10).
    pub compression_threshold_kb: usize,
    /// Concurrent warmup searches per batch (default: 3).
    pub warmup_batch_size: usize,
    /// Delay between warmup batches in milliseconds (default: 100).
    pub warmup_delay_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            max_entries: defaults.max_entries,
            max_memory_mb: defaults.max_memory_bytes / (1024 * 1024),
            default_ttl_secs: defaults.default_ttl.as_secs(),
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
            compression: defaults.compression,
            compression_threshold_kb: defaults.compression_threshold_bytes / 1024,
            warmup_batch_size: defaults.warmup_batch_size,
            warmup_delay_ms: defaults.warmup_delay.as_millis() as u64,
        }
    }
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig::new()
            .max_entries(section.max_entries)
            .max_memory_bytes(section.max_memory_mb.saturating_mul(1024 * 1024))
            .default_ttl(Duration::from_secs(section.default_ttl_secs))
            .cleanup_interval(Duration::from_secs(section.cleanup_interval_secs))
            .compression(section.compression)
            .compression_threshold_bytes(section.compression_threshold_kb.saturating_mul(1024))
            .warmup_batch_size(section.warmup_batch_size)
            .warmup_delay(Duration::from_millis(section.warmup_delay_ms))
    }
}

/// `[learner]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LearnerSection {
    /// Suggested TTL at score 0, in seconds (default: 60).
    pub min_ttl_secs: u64,
    /// Suggested TTL at score 1, in seconds (default: 1800).
    pub max_ttl_secs: u64,
    /// Maximum hot-query predictions (default: 20).
    pub max_predictions: usize,
    /// Frequency at which the frequency factor saturates (default: 10).
    pub frequency_ceiling: u64,
    /// Warmup pacing per tier in milliseconds (default: [50, 200, 500]).
    pub tier_delays_ms: [u64; 3],
}

impl Default for LearnerSection {
    fn default() -> Self {
        let defaults = LearnerConfig::default();
        Self {
            min_ttl_secs: defaults.min_ttl.as_secs(),
            max_ttl_secs: defaults.max_ttl.as_secs(),
            max_predictions: defaults.max_predictions,
            frequency_ceiling: defaults.frequency_ceiling,
            tier_delays_ms: defaults.tier_delays.map(|d| d.as_millis() as u64),
        }
    }
}

impl From<&LearnerSection> for LearnerConfig {
    fn from(section: &LearnerSection) -> Self {
        LearnerConfig::new()
            .min_ttl(Duration::from_secs(section.min_ttl_secs))
            .max_ttl(Duration::from_secs(section.max_ttl_secs))
            .max_predictions(section.max_predictions)
            .frequency_ceiling(section.frequency_ceiling)
            .tier_delays(section.tier_delays_ms.map(Duration::from_millis))
    }
}

/// `[state]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateSection {
    /// State file path. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// One `[[providers]]` entry: a provider answering from a fixed item list.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub items: Vec<ResultItem>,
}

impl StaticProviderConfig {
    pub fn build(&self) -> StaticProvider {
        let provider = StaticProvider::new(self.id.clone(), self.name.clone())
            .priority(self.priority)
            .items(self.items.iter().cloned());
        self.prefixes
            .iter()
            .fold(provider, |provider, prefix| provider.prefix(prefix.clone()))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.muninn/config.toml`
    /// 3. `/etc/muninn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    /// Like [`load`](Self::load), but falls back to defaults when no explicit
    /// path is given and no config file exists.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(path) => Self::load(Some(path)),
            None => match Self::find_config_path() {
                Some(path) => Self::load_from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// A broker builder carrying this configuration.
    pub fn builder(&self) -> MuninnBuilder {
        Muninn::builder()
            .dispatch((&self.dispatch).into())
            .cache((&self.cache).into())
            .learner((&self.learner).into())
    }

    /// Providers declared in `[[providers]]`.
    pub fn static_providers(&self) -> Vec<StaticProvider> {
        self.providers.iter().map(StaticProviderConfig::build).collect()
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::find_config_path().ok_or_else(|| {
            MuninnError::Configuration(
                "No config file found. Create ~/.muninn/config.toml or /etc/muninn/config.toml"
                    .to_string(),
            )
        })
    }

    fn find_config_path() -> Option<PathBuf> {
        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/muninn/config.toml");
        system_config.exists().then_some(system_config)
    }
}
