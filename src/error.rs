//! Error Types
//!
//! Failure taxonomy for the router and for backend adapters.

use std::fmt;
use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// Configuration errors (invalid JSON, missing fields, bad limits)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Usage persistence failed (file or table backend)
    #[error("Storage error: {0}")]
    Storage(String),

    /// No endpoint survived candidate expansion
    #[error("No endpoints available: no configured provider is registered and available")]
    NoEndpoints,

    /// Every candidate was skipped or failed
    #[error("All endpoints exhausted: {0}")]
    Exhausted(AttemptLog),
}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        RouterError::Storage(format!("IO error: {}", err))
    }
}

impl From<sqlx::Error> for RouterError {
    fn from(err: sqlx::Error) -> Self {
        RouterError::Storage(format!("SQL error: {}", err))
    }
}

/// Error returned by a backend adapter's `query_model`
#[derive(Debug, Error)]
pub enum BackendError {
    /// Provider-reported quota/throttle rejection. Says nothing about the
    /// endpoint's health, so it never feeds the circuit breaker.
    #[error("Rate limited{}", .retry_after.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// Provider-reported fault: auth failure, malformed request, 5xx.
    #[error("API error: {0}")]
    Api(String),

    /// Anything else. Treated like an API fault for breaker purposes.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a candidate was skipped or failed during one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CircuitOpen,
    RateLimited,
    InvalidModel,
    EmptyResponse,
    RateLimitError,
    ApiError,
    UnexpectedError,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::CircuitOpen => "circuit_open",
            SkipReason::RateLimited => "rate_limited",
            SkipReason::InvalidModel => "invalid_model",
            SkipReason::EmptyResponse => "empty_response",
            SkipReason::RateLimitError => "rate_limit_error",
            SkipReason::ApiError => "api_error",
            SkipReason::UnexpectedError => "unexpected_error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of every candidate attempted during one query
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    attempts: Vec<(String, SkipReason)>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, reason: SkipReason) {
        self.attempts.push((key.into(), reason));
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn attempts(&self) -> &[(String, SkipReason)] {
        &self.attempts
    }
}

impl fmt::Display for AttemptLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, reason)) in self.attempts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", key, reason)?;
        }
        Ok(())
    }
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;
