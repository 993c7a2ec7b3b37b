//! Request Router
//!
//! Issues one logical "ask a model" operation against the priority-ordered
//! candidate list, skipping endpoints that are quota-exhausted or unhealthy
//! and falling back to the next candidate on failure.

pub mod breaker;
pub mod candidates;

use parking_lot::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{BackendRegistry, QueryOptions};
use crate::config::{RouterConfig, StorageBackendKind};
use crate::error::{AttemptLog, BackendError, Result, RouterError, SkipReason};
use crate::storage::{FileStore, SqliteStore, UsageStore};
use crate::usage::UsageTracker;

pub use breaker::{CircuitBreakerRegistry, DEFAULT_FAILURE_THRESHOLD};
pub use candidates::{build_candidates, Endpoint};

/// Pause after a provider-side rate limit before trying the next candidate
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Routes queries across configured endpoints with fallback
pub struct Router {
    config: RouterConfig,
    backends: BackendRegistry,
    usage: UsageTracker,
    breakers: CircuitBreakerRegistry,
    candidates: RwLock<Vec<Endpoint>>,
}

impl Router {
    /// Build a router, opening the usage store named by the configuration
    pub async fn new(config: RouterConfig, backends: BackendRegistry) -> Result<Self> {
        let store: Box<dyn UsageStore> = match config.rate_limiting.storage_backend {
            StorageBackendKind::File => {
                Box::new(FileStore::new(&config.rate_limiting.storage_path))
            }
            StorageBackendKind::Table => {
                Box::new(SqliteStore::connect(&config.rate_limiting.storage_path).await?)
            }
        };

        Self::with_store(config, backends, store).await
    }

    /// Build a router over an explicit usage store
    pub async fn with_store(
        config: RouterConfig,
        backends: BackendRegistry,
        store: Box<dyn UsageStore>,
    ) -> Result<Self> {
        config.validate()?;
        let usage = UsageTracker::load(store).await?;
        let candidates = build_candidates(&config, &backends);

        debug!(endpoints = candidates.len(), "router constructed");

        Ok(Self {
            config,
            backends,
            usage,
            breakers: CircuitBreakerRegistry::default(),
            candidates: RwLock::new(candidates),
        })
    }

    /// Override the circuit breaker threshold (router-wide)
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breakers = CircuitBreakerRegistry::new(threshold);
        self
    }

    /// Rebuild the candidate list from configuration and current backend
    /// availability
    pub fn reload_endpoints(&self) {
        let rebuilt = build_candidates(&self.config, &self.backends);
        debug!(endpoints = rebuilt.len(), "endpoints reloaded");
        *self.candidates.write() = rebuilt;
    }

    /// Current candidate list in priority order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.candidates.read().clone()
    }

    /// The usage tracker backing this router
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Prune hour-old window entries from memory and the store
    pub async fn cleanup_stale(&self) -> Result<()> {
        self.usage.cleanup_stale().await
    }

    /// Ask the first healthy, in-quota endpoint and return its answer.
    ///
    /// Walks candidates in priority order; every per-candidate failure is
    /// converted into a skip and the next candidate is tried. Fails only
    /// when no candidate exists or every one was exhausted, with an error
    /// enumerating each candidate and the reason it was passed over.
    pub async fn query(&self, prompt: &str, opts: &QueryOptions) -> Result<String> {
        let candidates = self.candidates.read().clone();
        if candidates.is_empty() {
            return Err(RouterError::NoEndpoints);
        }

        let limiting = self.config.rate_limiting.enabled;
        let mut attempts = AttemptLog::new();
        let last = candidates.len() - 1;

        for (idx, endpoint) in candidates.iter().enumerate() {
            let key = endpoint.key();

            if self.breakers.is_open(&key) {
                debug!(endpoint = %key, "skipping: circuit open");
                attempts.push(key, SkipReason::CircuitOpen);
                continue;
            }

            if limiting
                && !self.usage.can_make_request(
                    &endpoint.backend,
                    &endpoint.model,
                    endpoint.rpm,
                    endpoint.rpd,
                )
            {
                debug!(endpoint = %key, "skipping: rate limited");
                attempts.push(key, SkipReason::RateLimited);
                continue;
            }

            // Candidates are built from registered backends, so this only
            // misses if the registry changed under a stale candidate list.
            let Some(backend) = self.backends.get(&endpoint.backend) else {
                attempts.push(key, SkipReason::UnexpectedError);
                continue;
            };

            if !backend.validate_model(&endpoint.model) {
                debug!(endpoint = %key, "skipping: model not served");
                attempts.push(key, SkipReason::InvalidModel);
                continue;
            }

            let call = backend.query_model(&endpoint.model, prompt, opts);
            match tokio::time::timeout(endpoint.timeout, call).await {
                Ok(Ok(text)) => {
                    if text.trim().is_empty() {
                        // Soft failure: no usage charged, no breaker penalty
                        warn!(endpoint = %key, "empty response, trying next candidate");
                        attempts.push(key, SkipReason::EmptyResponse);
                        continue;
                    }

                    if limiting {
                        if let Err(e) = self
                            .usage
                            .record_request(&endpoint.backend, &endpoint.model)
                            .await
                        {
                            // The answer is good; a failed usage write must
                            // not turn it into a query failure.
                            warn!(endpoint = %key, error = %e, "usage not persisted");
                        }
                    }
                    self.breakers.record_success(&key);

                    info!(endpoint = %key, fallbacks = idx, "query succeeded");
                    return Ok(text);
                }
                Ok(Err(BackendError::RateLimited { retry_after })) => {
                    warn!(endpoint = %key, ?retry_after, "provider rate limit");
                    attempts.push(key, SkipReason::RateLimitError);
                    if idx < last {
                        tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                    }
                }
                Ok(Err(BackendError::Api(msg))) => {
                    warn!(endpoint = %key, error = %msg, "API error");
                    self.breakers.record_failure(&key);
                    attempts.push(key, SkipReason::ApiError);
                }
                Ok(Err(BackendError::Other(e))) => {
                    warn!(endpoint = %key, error = %e, "unexpected error");
                    self.breakers.record_failure(&key);
                    attempts.push(key, SkipReason::UnexpectedError);
                }
                Err(_elapsed) => {
                    warn!(endpoint = %key, timeout = ?endpoint.timeout, "backend call timed out");
                    self.breakers.record_failure(&key);
                    attempts.push(key, SkipReason::UnexpectedError);
                }
            }
        }

        warn!(%attempts, "all endpoints exhausted");
        Err(RouterError::Exhausted(attempts))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("backends", &self.backends)
            .field("endpoints", &self.candidates.read().len())
            .finish()
    }
}
