//! Circuit Breaker Registry
//!
//! Per-endpoint consecutive-failure counters with an open/closed decision.
//! State lives only in memory; a process restart starts every endpoint
//! closed again. Rate-limit outcomes never reach this registry, only API
//! and unexpected faults do.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Failures in a row before an endpoint is skipped
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Tracks endpoint health by consecutive failures
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    threshold: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the endpoint should be skipped
    pub fn is_open(&self, key: &str) -> bool {
        self.failures
            .lock()
            .get(key)
            .map(|&count| count >= self.threshold)
            .unwrap_or(false)
    }

    /// Count one fault against the endpoint
    pub fn record_failure(&self, key: &str) {
        let mut failures = self.failures.lock();
        *failures.entry(key.to_string()).or_insert(0) += 1;
    }

    /// A success closes the circuit again
    pub fn record_success(&self, key: &str) {
        let mut failures = self.failures.lock();
        failures.insert(key.to_string(), 0);
    }

    /// Current consecutive-failure count for an endpoint
    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_until_threshold() {
        let breakers = CircuitBreakerRegistry::new(3);

        breakers.record_failure("openai:gpt-4");
        breakers.record_failure("openai:gpt-4");
        assert!(!breakers.is_open("openai:gpt-4"));

        breakers.record_failure("openai:gpt-4");
        assert!(breakers.is_open("openai:gpt-4"));
    }

    #[test]
    fn test_success_resets_counter() {
        let breakers = CircuitBreakerRegistry::new(2);

        breakers.record_failure("openai:gpt-4");
        breakers.record_failure("openai:gpt-4");
        assert!(breakers.is_open("openai:gpt-4"));

        breakers.record_success("openai:gpt-4");
        assert!(!breakers.is_open("openai:gpt-4"));
        assert_eq!(breakers.failure_count("openai:gpt-4"), 0);
    }

    #[test]
    fn test_unknown_endpoint_is_closed() {
        let breakers = CircuitBreakerRegistry::default();
        assert!(!breakers.is_open("never:seen"));
        assert_eq!(breakers.failure_count("never:seen"), 0);
    }

    #[test]
    fn test_endpoints_independent() {
        let breakers = CircuitBreakerRegistry::new(1);

        breakers.record_failure("openai:gpt-4");
        assert!(breakers.is_open("openai:gpt-4"));
        assert!(!breakers.is_open("openai:gpt-4o-mini"));
    }
}
