//! Backend Adapters
//!
//! The capability contract each provider integration implements, plus the
//! registry the router resolves providers from.

pub mod http;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BackendError;

pub use http::HttpBackend;

/// Options forwarded to a backend call
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Completion length cap
    pub max_tokens: Option<u32>,

    /// Optional system prompt sent ahead of the user prompt
    pub system: Option<String>,

    /// Provider-specific extras, passed through verbatim
    pub extra: HashMap<String, serde_json::Value>,
}

/// Contract implemented by every provider adapter.
///
/// Adapters are independent implementations with no shared state; the router
/// only ever talks to them through this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Provider name as it appears in configuration
    fn name(&self) -> &str;

    /// Whether this backend is usable at all (credentials present, reachable)
    fn is_available(&self) -> bool;

    /// Whether the given model identifier is served by this backend
    fn validate_model(&self, model: &str) -> bool;

    /// Ask the model. Returns the completion text, or a classified error:
    /// `RateLimited` for quota rejections, `Api` for provider faults,
    /// `Other` for anything unexpected.
    async fn query_model(
        &self,
        model: &str,
        prompt: &str,
        opts: &QueryOptions,
    ) -> std::result::Result<String, BackendError>;
}

/// Registry of backend adapters keyed by provider name
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name. Replaces any previous
    /// registration for that name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
