//! # pulse-core
//!
//! Core crate for the Pulse real-time metrics broadcaster. Contains the
//! configuration schemas, the metrics snapshot model, the authenticated
//! principal, the collaborator traits (authentication and metric sampling),
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other Pulse crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
