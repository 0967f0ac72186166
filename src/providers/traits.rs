//! Provider capability contract.
//!
//! Every search domain (applications, files, calculator, unit conversion, ...)
//! is an independent [`SearchProvider`]. The broker only ever talks to
//! providers through this trait, so a provider can be added or removed
//! without touching dispatch, caching or learning.
//!
//! # Failure semantics
//!
//! Providers report failure by returning `Err`. The dispatcher converts any
//! error, panic or timeout into an empty contribution and increments the
//! provider's error counter; one provider failing never affects the others.
//!
//! # Example
//!
//! ```ignore
//! struct Calculator;
//!
//! #[async_trait]
//! impl SearchProvider for Calculator {
//!     fn id(&self) -> &str { "calc" }
//!     fn name(&self) -> &str { "Calculator" }
//!     fn search_prefixes(&self) -> &[String] { &self.prefixes }
//!
//!     async fn search(&self, context: &QueryContext) -> Result<Vec<ResultItem>> {
//!         match evaluate(context.raw()) {
//!             Some(value) => Ok(vec![ResultItem::new("calc:result", value.to_string())]),
//!             None => Ok(Vec::new()),
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{ProviderSettings, QueryContext, ResultItem, SettingSchema};

/// An independent unit answering queries for one domain.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Unique, stable identifier. Also the cache scope for this provider.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Higher values win when providers compete for the same routing prefix.
    fn priority(&self) -> i32 {
        0
    }

    /// Enabled state used when nothing has been persisted for this provider.
    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Query prefixes this provider claims exclusively (e.g. `"="`, `"app:"`).
    fn search_prefixes(&self) -> &[String] {
        &[]
    }

    /// Declared settings. Values passed to [`configure`](Self::configure) are
    /// validated against this schema first.
    fn settings_schema(&self) -> Vec<SettingSchema> {
        Vec::new()
    }

    /// Answer a query.
    async fn search(&self, context: &QueryContext) -> Result<Vec<ResultItem>>;

    /// One-time setup, run at registration (and retried lazily on first use
    /// if it failed).
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Teardown, run at unregistration.
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }

    /// Apply validated settings (defaults already filled in).
    async fn configure(&self, _settings: &ProviderSettings) -> Result<()> {
        Ok(())
    }
}
