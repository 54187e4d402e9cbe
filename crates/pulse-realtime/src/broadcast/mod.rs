//! Periodic snapshot broadcast.

pub mod engine;
pub mod sampling;

pub use engine::{BroadcastEngine, TickReport};
pub use sampling::GuardedSampler;
