//! Route handlers.

pub mod breakers;
pub mod health;
pub mod ws;
