//! `sysinfo`-backed sampler.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, Networks, System};
use tracing::debug;

use pulse_core::config::SamplerConfig;
use pulse_core::error::AppError;
use pulse_core::result::AppResult;
use pulse_core::traits::MetricsSampler;
use pulse_core::types::{NetworkStats, Snapshot};

use crate::usage;

/// Samples the local host.
///
/// The `System` handle is kept between samples so CPU usage is measured over
/// the interval since the previous tick. The first sample waits
/// `cpu_window_ms` between two refreshes to get a meaningful reading.
#[derive(Debug, Clone)]
pub struct SystemSampler {
    config: SamplerConfig,
    state: Arc<Mutex<SamplerState>>,
}

#[derive(Debug)]
struct SamplerState {
    system: System,
    primed: bool,
}

impl SystemSampler {
    /// Create a sampler. No system calls happen until the first sample.
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SamplerState {
                system: System::new(),
                primed: false,
            })),
        }
    }

    fn collect(state: &mut SamplerState, config: &SamplerConfig) -> Snapshot {
        if !state.primed {
            state.system.refresh_cpu_usage();
            let window = Duration::from_millis(config.cpu_window_ms)
                .max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            std::thread::sleep(window);
            state.primed = true;
        }

        let system = &mut state.system;
        system.refresh_cpu_usage();
        system.refresh_memory();
        system.refresh_processes();

        let total_memory = system.total_memory();
        let used_memory = total_memory.saturating_sub(system.available_memory());

        let disks = Disks::new_with_refreshed_list();
        let mount = config.disk_mount.as_deref().map(Path::new);
        let disk_percent = usage::disk_usage(
            disks
                .list()
                .iter()
                .filter(|disk| mount.is_none_or(|m| disk.mount_point() == m))
                .map(|disk| (disk.total_space(), disk.available_space())),
        );

        let networks = Networks::new_with_refreshed_list();
        let mut network_stats = NetworkStats::default();
        for (_name, data) in &networks {
            network_stats.bytes_sent = network_stats.bytes_sent.saturating_add(data.total_transmitted());
            network_stats.bytes_recv = network_stats.bytes_recv.saturating_add(data.total_received());
            network_stats.packets_sent = network_stats
                .packets_sent
                .saturating_add(data.total_packets_transmitted());
            network_stats.packets_recv = network_stats
                .packets_recv
                .saturating_add(data.total_packets_received());
        }

        Snapshot {
            cpu_percent: usage::cpu_percent(system.global_cpu_info().cpu_usage()),
            memory_percent: usage::percent(used_memory, total_memory),
            disk_percent,
            network_stats,
            process_count: system.processes().len() as u64,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl MetricsSampler for SystemSampler {
    async fn sample(&self) -> AppResult<Snapshot> {
        let state = Arc::clone(&self.state);
        let config = self.config.clone();

        let snapshot = tokio::task::spawn_blocking(move || {
            let mut state = state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Self::collect(&mut state, &config)
        })
        .await
        .map_err(|e| AppError::internal(format!("Sampler task failed: {e}")))?;

        debug!(
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            disk = snapshot.disk_percent,
            processes = snapshot.process_count,
            "Collected system snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sample_returns_bounded_percentages() {
        let sampler = SystemSampler::new(SamplerConfig {
            cpu_window_ms: 10,
            ..SamplerConfig::default()
        });
        let first = sampler.sample().await.unwrap();
        let second = sampler.sample().await.unwrap();

        for snapshot in [&first, &second] {
            assert!((0.0..=100.0).contains(&snapshot.cpu_percent));
            assert!((0.0..=100.0).contains(&snapshot.memory_percent));
            assert!((0.0..=100.0).contains(&snapshot.disk_percent));
        }
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_mount_reads_zero_disk() {
        let sampler = SystemSampler::new(SamplerConfig {
            cpu_window_ms: 10,
            disk_mount: Some("/definitely/not/a/mount".into()),
            ..SamplerConfig::default()
        });
        assert_eq!(sampler.sample().await.unwrap().disk_percent, 0.0);
    }
}
