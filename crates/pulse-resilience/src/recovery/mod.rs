//! Error classification and recovery decisions.
//!
//! Every failure on the broadcast path is turned into a [`Failure`], classified
//! into an [`ErrorContext`], and mapped by the [`RecoveryPolicy`] onto exactly
//! one [`RecoveryAction`]. The decision table lives in one place so tests can
//! cover it exhaustively.

pub mod failure;
pub mod policy;
pub mod retry;

pub use failure::Failure;
pub use policy::{ErrorContext, ErrorKind, RecoveryAction, RecoveryPolicy, Severity};
pub use retry::{RetryError, retry_with_policy};
