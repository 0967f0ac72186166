//! Muninn - federated query broker for launcher search providers
//!
//! A launcher front end hands every keystroke's query to one [`Broker`].
//! The broker fans the query out to independent search providers (apps,
//! files, calculator, ...), isolates their failures, merges and ranks the
//! answers, caches them, and learns from the traffic which queries are
//! worth warming ahead of time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use muninn::{Muninn, ResultItem, StaticProvider};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let broker = Muninn::builder().build()?;
//!
//!     let apps = StaticProvider::new("apps", "Applications")
//!         .prefix("app:")
//!         .item(ResultItem::new("mail", "Mail").with_description("Read email"));
//!     broker.register(Arc::new(apps)).await?;
//!
//!     for item in broker.search("mail").await {
//!         println!("{} ({})", item.title, item.provider_id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Writing a provider
//!
//! Implement [`SearchProvider`]. Only `id`, `name` and `search` are
//! required; priority, prefixes, a settings schema and lifecycle hooks have
//! defaults.
//!
//! ```rust
//! use async_trait::async_trait;
//! use muninn::{QueryContext, ResultItem, SearchProvider};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl SearchProvider for Echo {
//!     fn id(&self) -> &str { "echo" }
//!     fn name(&self) -> &str { "Echo" }
//!
//!     async fn search(&self, context: &QueryContext) -> muninn::Result<Vec<ResultItem>> {
//!         Ok(vec![ResultItem::new(context.normalized(), context.raw())])
//!     }
//! }
//! ```

pub mod broker;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod learner;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use broker::{Broker, Muninn, MuninnBuilder};
pub use cache::{CacheConfig, CacheKey, CacheStats, ResultCache, WarmupReport};
pub use config::Config;
pub use dispatch::{DispatchConfig, QueryDispatcher};
pub use error::{MuninnError, Result};
pub use events::{BrokerEvent, EventBus, ListenerId};
pub use learner::{LearnerConfig, QueryPrediction, UsageLearner};
pub use providers::{
    HealthSnapshot, Lifecycle, ProviderRegistry, RegisteredProvider, SearchProvider,
    StaticProvider,
};
pub use store::{
    JsonFileStore, MemoryStore, ProviderState, StateSnapshot, Store, UsageMetrics, UsageSample,
};
pub use version::{BuildInfo, PKG_VERSION};

// Re-export all types
pub use types::{
    CachePriority, CacheStrategy, ProviderSettings, QueryContext, ResultAction, ResultItem,
    SettingKind, SettingSchema, SettingValue, normalize_query,
};
