//! Reconciliation configuration.

use serde::{Deserialize, Serialize};

/// Friend-list size the social service refuses to grow past.
pub const FRIEND_CAPACITY: usize = 1000;

/// Configuration for the friend reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// An account whose friend list reaches this size is "full": it is
    /// left untouched by reconciliation and skipped by the auto-friend
    /// sweep until it drops below again.
    pub friend_capacity: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            friend_capacity: FRIEND_CAPACITY,
        }
    }
}
