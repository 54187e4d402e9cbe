//! Overflow policy for full buffers.

use serde::{Deserialize, Serialize};

use pulse_core::config::OverflowPolicyConfig;

/// What a full buffer does with an incoming item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming item; buffered items are untouched.
    #[default]
    DropNewest,
    /// Evict the oldest buffered item to make room.
    DropOldest,
}

impl From<OverflowPolicyConfig> for OverflowPolicy {
    fn from(config: OverflowPolicyConfig) -> Self {
        match config {
            OverflowPolicyConfig::DropNewest => Self::DropNewest,
            OverflowPolicyConfig::DropOldest => Self::DropOldest,
        }
    }
}
