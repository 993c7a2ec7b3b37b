//! Configuration Schema
//!
//! Defines the provider/model configuration the router is built from.
//! Provider order and model order are significant: together they form the
//! fallback priority order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, RouterError};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Providers in priority order
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Fallback values for models that omit their own limits
    #[serde(default)]
    pub defaults: EndpointDefaults,

    /// Usage accounting settings
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// A provider and its models, in priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Backend name; must match a registered backend adapter
    pub name: String,

    /// Models in priority order
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// A single model under a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: String,

    /// Requests per minute; falls back to `defaults.rpm`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,

    /// Requests per day; falls back to `defaults.rpd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpd: Option<u32>,

    /// Per-call timeout in seconds; falls back to `defaults.timeout`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Configuration-wide default limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDefaults {
    pub rpm: u32,
    pub rpd: u32,

    /// Seconds
    pub timeout: u64,
}

impl Default for EndpointDefaults {
    fn default() -> Self {
        Self {
            rpm: 60,
            rpd: 1500,
            timeout: 30,
        }
    }
}

/// Usage accounting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// When false, the router skips the usage gate and records nothing
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub storage_backend: StorageBackendKind,

    /// Path to the usage file (file backend) or database (table backend)
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_backend: StorageBackendKind::default(),
            storage_path: default_storage_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_storage_path() -> String {
    "llm_usage.json".to_string()
}

/// Which usage store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    File,
    Table,
}

impl RouterConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RouterError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants the deserializer cannot express
    pub fn validate(&self) -> Result<()> {
        if self.defaults.rpm == 0 || self.defaults.rpd == 0 {
            return Err(RouterError::Config(
                "defaults.rpm and defaults.rpd must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(RouterError::Config(
                    "provider name must not be empty".to_string(),
                ));
            }

            for model in &provider.models {
                if model.model.is_empty() {
                    return Err(RouterError::Config(format!(
                        "provider '{}' has a model with an empty name",
                        provider.name
                    )));
                }
                if model.rpm == Some(0) || model.rpd == Some(0) {
                    return Err(RouterError::Config(format!(
                        "{}:{} has a zero rate limit",
                        provider.name, model.model
                    )));
                }

                let key = format!("{}:{}", provider.name, model.model);
                if !seen.insert(key.clone()) {
                    return Err(RouterError::Config(format!(
                        "duplicate endpoint '{}'",
                        key
                    )));
                }
            }
        }

        Ok(())
    }
}
