//! Circuit breaker, retry, and backpressure configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resilience primitives configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Default breaker settings for upstream dependencies (e.g. the sampler).
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    /// Breaker settings for each connection's delivery path.
    #[serde(default = "default_delivery_breaker")]
    pub delivery_breaker: BreakerSettings,
    /// Retry/backoff settings for the recovery policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-connection buffer overflow handling.
    #[serde(default)]
    pub backpressure: BackpressureConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: BreakerSettings::default(),
            delivery_breaker: default_delivery_breaker(),
            retry: RetryConfig::default(),
            backpressure: BackpressureConfig::default(),
        }
    }
}

/// Thresholds for one circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Time the breaker stays open before admitting a probe, in milliseconds.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_ms: u64,
}

impl BreakerSettings {
    /// Open-state cool-down.
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_ms: default_reset_timeout(),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

/// What a full per-connection buffer does with a new frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyConfig {
    /// Reject the incoming frame (bounded FIFO).
    #[default]
    DropNewest,
    /// Evict the oldest buffered frame to admit the incoming one.
    DropOldest,
}

/// Backpressure configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Overflow policy for per-connection buffers.
    #[serde(default)]
    pub overflow_policy: OverflowPolicyConfig,
}

fn default_delivery_breaker() -> BreakerSettings {
    BreakerSettings {
        max_failures: 3,
        reset_timeout_ms: 10_000,
    }
}

fn default_max_failures() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}
