//! Metric sampler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// System metric sampler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Ceiling for a single sample in milliseconds. Slower samples count as failures.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Interval between the two CPU refreshes needed for a usage reading.
    #[serde(default = "default_cpu_window")]
    pub cpu_window_ms: u64,
    /// Restrict disk usage to a single mount point (all disks when unset).
    #[serde(default)]
    pub disk_mount: Option<String>,
}

impl SamplerConfig {
    /// Sampling ceiling as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            cpu_window_ms: default_cpu_window(),
            disk_mount: None,
        }
    }
}

fn default_timeout() -> u64 {
    800
}

fn default_cpu_window() -> u64 {
    200
}
