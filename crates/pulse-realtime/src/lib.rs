//! # pulse-realtime
//!
//! Real-time broadcast engine for Pulse. Provides:
//!
//! - Authenticated connection lifecycle with a single registry of live members
//! - A periodic broadcaster that samples once per tick and fans out to every member
//! - Per-connection bounded outbound buffers and delivery circuit breakers
//! - Heartbeats, idle eviction, and graceful drain on shutdown

pub mod broadcast;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod server;

pub use broadcast::engine::{BroadcastEngine, TickReport};
pub use connection::manager::ConnectionManager;
pub use connection::registry::ConnectionRegistry;
pub use server::RealtimeEngine;
