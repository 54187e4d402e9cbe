//! Wire messages exchanged with stream clients.

pub mod serializer;
pub mod types;

pub use types::{InboundMessage, OutboundMessage};
