//! Named breakers shared across the process.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};

/// Concurrent map of breakers keyed by resource name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers use `defaults` unless told otherwise.
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
        }
    }

    /// Fetch the breaker for `name`, creating it with the default thresholds.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    /// Fetch the breaker for `name`, creating it with `config` if absent.
    ///
    /// An existing breaker keeps its original thresholds.
    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = %name, "Created circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .value()
            .clone()
    }

    /// Look up an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Drop a breaker, e.g. when its connection goes away.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(name).map(|(_, b)| b)
    }

    /// Number of tracked breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breakers are tracked.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Stats for every breaker whose name satisfies `filter`, sorted by name.
    pub fn stats_matching(&self, filter: impl Fn(&str) -> bool) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self
            .breakers
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| entry.value().stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Stats for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        self.stats_matching(|_| true)
    }
}
