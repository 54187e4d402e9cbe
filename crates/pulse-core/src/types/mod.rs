//! Core type definitions shared across the Pulse workspace.

pub mod principal;
pub mod snapshot;

pub use principal::Principal;
pub use snapshot::{NetworkStats, Snapshot};
