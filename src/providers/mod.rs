//! Search providers: the capability contract, the registry that owns them,
//! their health counters, and a simple in-memory provider.

pub mod health;
pub mod registry;
mod static_list;
pub mod traits;

pub use health::{HealthSnapshot, ProviderHealth};
pub use registry::{Lifecycle, ProviderRegistry, RegisteredProvider};
pub use static_list::StaticProvider;
pub use traits::SearchProvider;
