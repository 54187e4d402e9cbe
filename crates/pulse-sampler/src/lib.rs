//! # pulse-sampler
//!
//! [`SystemSampler`] implements [`pulse_core::traits::MetricsSampler`] on top of
//! `sysinfo`. Collection is blocking, so every sample runs on Tokio's
//! blocking pool.

pub mod system;
pub mod usage;

pub use system::SystemSampler;
