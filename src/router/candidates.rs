//! Candidate List Builder
//!
//! Expands the ordered provider/model configuration into the flat,
//! priority-ordered endpoint list one query walks. Order in configuration
//! is the fallback order; there is no reordering based on past performance.

use std::fmt;
use std::time::Duration;

use crate::backend::BackendRegistry;
use crate::config::RouterConfig;

/// A single (backend, model) pair with its effective limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub backend: String,
    pub model: String,
    pub rpm: u32,
    pub rpd: u32,
    pub timeout: Duration,
}

impl Endpoint {
    /// Composite key used for usage accounting and breaker state
    pub fn key(&self) -> String {
        format!("{}:{}", self.backend, self.model)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.model)
    }
}

/// Expand configuration into the priority-ordered candidate list.
///
/// Providers whose backend is not registered, or reports itself
/// unavailable, are skipped entirely. Missing per-model limits fall back to
/// the configuration-wide defaults.
pub fn build_candidates(config: &RouterConfig, backends: &BackendRegistry) -> Vec<Endpoint> {
    let mut candidates = Vec::new();

    for provider in &config.providers {
        let available = backends
            .get(&provider.name)
            .map(|b| b.is_available())
            .unwrap_or(false);
        if !available {
            continue;
        }

        for model in &provider.models {
            candidates.push(Endpoint {
                backend: provider.name.clone(),
                model: model.model.clone(),
                rpm: model.rpm.unwrap_or(config.defaults.rpm),
                rpd: model.rpd.unwrap_or(config.defaults.rpd),
                timeout: Duration::from_secs(model.timeout.unwrap_or(config.defaults.timeout)),
            });
        }
    }

    candidates
}
