//! Bounded buffers between a fast producer and a slow consumer.

pub mod handler;
pub mod policy;

pub use handler::{BackpressureHandler, BackpressureState, OfferOutcome};
pub use policy::OverflowPolicy;
