//! Provider registry and lifecycle.
//!
//! The `ProviderRegistry` owns every registered [`SearchProvider`] together
//! with its enabled flag, lifecycle state and health counters. It is plain
//! bookkeeping: ranking and fan-out happen in the dispatcher.
//!
//! # Lifecycle
//!
//! ```text
//!   register ──► Uninitialized ──initialize ok──► Initialized ──unregister──► Destroyed
//!                      │                               ▲
//!                      └── initialize failed ──────────┘ (retried lazily on first search)
//! ```
//!
//! # Persistence
//!
//! Enabled flags and settings are persisted through [`ProviderState`] so they
//! survive restarts. Store failures are logged and never fail a registry call;
//! the in-memory state remains authoritative for the current process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use super::health::{HealthSnapshot, ProviderHealth};
use super::traits::SearchProvider;
use crate::events::{BrokerEvent, EventBus};
use crate::store::ProviderState;
use crate::types::ProviderSettings;
use crate::{MuninnError, Result};

/// Lifecycle state of a registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// A provider plus the registry's bookkeeping for it.
pub struct RegisteredProvider {
    provider: Arc<dyn SearchProvider>,
    enabled: AtomicBool,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    health: ProviderHealth,
}

impl RegisteredProvider {
    fn new(provider: Arc<dyn SearchProvider>) -> Self {
        let enabled = provider.enabled_by_default();
        Self {
            provider,
            enabled: AtomicBool::new(enabled),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Uninitialized),
            health: ProviderHealth::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.provider.id()
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn priority(&self) -> i32 {
        self.provider.priority()
    }

    pub fn provider(&self) -> &Arc<dyn SearchProvider> {
        &self.provider
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn health(&self) -> &ProviderHealth {
        &self.health
    }

    pub fn error_count(&self) -> u64 {
        self.health.error_count()
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().await
    }

    /// Run the provider's `initialize` hook unless it already succeeded.
    ///
    /// Concurrent callers are serialized; only one runs the hook. A failure
    /// is counted against the provider and leaves it uninitialized, so the
    /// next call retries.
    pub async fn ensure_initialized(&self) -> Result<()> {
        let mut state = self.lifecycle.lock().await;
        match *state {
            Lifecycle::Initialized => Ok(()),
            Lifecycle::Destroyed => Err(MuninnError::provider(self.id(), "provider was destroyed")),
            Lifecycle::Uninitialized => match self.provider.initialize().await {
                Ok(()) => {
                    *state = Lifecycle::Initialized;
                    debug!(provider = self.id(), "provider initialized");
                    Ok(())
                }
                Err(e) => {
                    self.health.record_error();
                    Err(e)
                }
            },
        }
    }

    async fn destroy(&self) {
        let mut state = self.lifecycle.lock().await;
        if *state == Lifecycle::Initialized
            && let Err(e) = self.provider.destroy().await
        {
            self.health.record_error();
            warn!(provider = self.id(), error = %e, "provider destroy hook failed");
        }
        *state = Lifecycle::Destroyed;
    }

    /// The prefix this provider claims at the start of `raw`, compared
    /// case-insensitively.
    pub fn matching_prefix(&self, raw: &str) -> Option<&str> {
        self.provider
            .search_prefixes()
            .iter()
            .map(String::as_str)
            .find(|prefix| starts_with_ignore_case(raw, prefix))
    }

    /// Whether this provider claims `prefix` (case-insensitive).
    pub fn claims_prefix(&self, prefix: &str) -> bool {
        self.provider
            .search_prefixes()
            .iter()
            .any(|p| p.to_lowercase() == prefix.to_lowercase())
    }
}

/// Case-insensitive `str::starts_with` that never splits a character.
pub(crate) fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && haystack.len() >= prefix.len()
        && haystack.is_char_boundary(prefix.len())
        && haystack[..prefix.len()].to_lowercase() == prefix.to_lowercase()
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.id())
            .field("enabled", &self.is_enabled())
            .field("health", &self.health)
            .finish()
    }
}

/// Registry of search providers keyed by id.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<RegisteredProvider>>>,
    state: ProviderState,
    events: Arc<EventBus>,
}

impl ProviderRegistry {
    pub fn new(state: ProviderState, events: Arc<EventBus>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            state,
            events,
        }
    }

    /// Register a provider.
    ///
    /// Fails with [`MuninnError::DuplicateProvider`] if the id is taken; the
    /// existing registration is kept. Otherwise runs the provider's
    /// `initialize` hook, applies persisted enabled flag and settings, and
    /// emits [`BrokerEvent::ProviderRegistered`].
    #[instrument(skip(self, provider), fields(provider = provider.id()))]
    pub async fn register(&self, provider: Arc<dyn SearchProvider>) -> Result<Arc<RegisteredProvider>> {
        let id = provider.id().to_string();
        let entry = Arc::new(RegisteredProvider::new(provider));
        {
            let mut providers = self.providers.write();
            if providers.contains_key(&id) {
                return Err(MuninnError::DuplicateProvider(id));
            }
            providers.insert(id.clone(), Arc::clone(&entry));
        }

        if let Err(e) = entry.ensure_initialized().await {
            warn!(provider = %id, error = %e, "provider initialization failed, retrying on first use");
        }

        match self.state.enabled_flag(&id).await {
            Ok(Some(enabled)) => entry.set_enabled(enabled),
            Ok(None) => {}
            Err(e) => warn!(provider = %id, error = %e, "failed to read persisted enabled flag"),
        }

        self.apply_persisted_settings(&entry).await;

        info!(provider = %id, enabled = entry.is_enabled(), "provider registered");
        self.events
            .emit(&BrokerEvent::ProviderRegistered { provider: id });
        Ok(entry)
    }

    async fn apply_persisted_settings(&self, entry: &RegisteredProvider) {
        let settings = match self.state.settings(entry.id()).await {
            Ok(Some(settings)) => settings,
            Ok(None) => return,
            Err(e) => {
                warn!(provider = entry.id(), error = %e, "failed to read persisted settings");
                return;
            }
        };
        let schema = entry.provider.settings_schema();
        if let Err(e) = settings.validate(entry.id(), &schema) {
            warn!(provider = entry.id(), error = %e, "ignoring persisted settings");
            return;
        }
        if let Err(e) = entry.provider.configure(&settings.resolved(&schema)).await {
            entry.health.record_error();
            warn!(provider = entry.id(), error = %e, "failed to apply persisted settings");
        }
    }

    /// Unregister a provider, running its `destroy` hook.
    ///
    /// Unknown ids are logged and ignored.
    #[instrument(skip(self))]
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let removed = self.providers.write().remove(id);
        let Some(entry) = removed else {
            warn!(provider = id, "unregister of unknown provider ignored");
            return Ok(());
        };
        entry.destroy().await;
        info!(provider = id, "provider unregistered");
        self.events.emit(&BrokerEvent::ProviderUnregistered {
            provider: id.to_string(),
        });
        Ok(())
    }

    /// Enable a provider. Idempotent.
    pub async fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true).await
    }

    /// Disable a provider. Idempotent.
    pub async fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let entry = self
            .get(id)
            .ok_or_else(|| MuninnError::UnknownProvider(id.to_string()))?;
        entry.set_enabled(enabled);
        if let Err(e) = self.state.set_enabled_flag(id, enabled).await {
            warn!(provider = id, enabled, error = %e, "failed to persist enabled flag");
        }
        let provider = id.to_string();
        self.events.emit(&if enabled {
            BrokerEvent::ProviderEnabled { provider }
        } else {
            BrokerEvent::ProviderDisabled { provider }
        });
        Ok(())
    }

    /// Validate and apply new settings for a provider.
    ///
    /// Returns the effective settings (schema defaults filled in). Invalid
    /// settings are rejected before the provider sees them; a failing
    /// `configure` hook is counted, reported, and nothing is persisted.
    #[instrument(skip(self, settings))]
    pub async fn configure(&self, id: &str, settings: ProviderSettings) -> Result<ProviderSettings> {
        let entry = self
            .get(id)
            .ok_or_else(|| MuninnError::UnknownProvider(id.to_string()))?;
        let schema = entry.provider.settings_schema();
        settings.validate(id, &schema)?;
        let resolved = settings.resolved(&schema);

        if let Err(e) = entry.provider.configure(&resolved).await {
            entry.health.record_error();
            warn!(provider = id, error = %e, "provider rejected configuration");
            return Err(e);
        }
        if let Err(e) = self.state.set_settings(id, &settings).await {
            warn!(provider = id, error = %e, "failed to persist settings");
        }
        self.events.emit(&BrokerEvent::ProviderConfigured {
            provider: id.to_string(),
            settings: resolved.clone(),
        });
        Ok(resolved)
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegisteredProvider>> {
        self.providers.read().get(id).cloned()
    }

    /// All providers, highest priority first (ties by id).
    pub fn list(&self) -> Vec<Arc<RegisteredProvider>> {
        let mut providers: Vec<_> = self.providers.read().values().cloned().collect();
        providers.sort_by(|a, b| b.priority().cmp(&a.priority()).then_with(|| a.id().cmp(b.id())));
        providers
    }

    /// Enabled providers. Callers must not rely on the order.
    pub fn list_enabled(&self) -> Vec<Arc<RegisteredProvider>> {
        self.list().into_iter().filter(|p| p.is_enabled()).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.list().iter().map(|p| p.id().to_string()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    pub fn health(&self, id: &str) -> Option<HealthSnapshot> {
        self.get(id).map(|p| p.health.snapshot())
    }

    pub fn error_count(&self, id: &str) -> Option<u64> {
        self.get(id).map(|p| p.error_count())
    }

    pub fn state(&self) -> &ProviderState {
        &self.state
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
