//! Public types for the Muninn API.

mod item;
mod query;
mod settings;
mod strategy;

pub use item::{ResultAction, ResultItem};
pub use query::{QueryContext, normalize_query};
pub use settings::{ProviderSettings, SettingKind, SettingSchema, SettingValue};
pub use strategy::{CachePriority, CacheStrategy};
