//! Configuration
//!
//! Router configuration schema and loading.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    EndpointDefaults, ModelEntry, ProviderEntry, RateLimitingConfig, RouterConfig,
    StorageBackendKind,
};
