//! Presence manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minecraft's service configuration id.
pub const MINECRAFT_SCID: &str = "4fc10100-5f7a-4470-899b-280835760c07";
/// Session template Minecraft lobbies are created from.
pub const MINECRAFT_TEMPLATE: &str = "MinecraftLobby";

/// Configuration for one presence manager.
///
/// Every field has a default, so a JSON object only needs the fields it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Service configuration id the session lives under.
    pub service_config_id: String,
    /// Session template name.
    pub template_name: String,
    /// Milliseconds between heartbeats. Must stay below the directory's
    /// idle expiry (roughly 30 s).
    pub heartbeat_interval_ms: u64,
    /// Consecutive start attempts without reaching `Connected` after
    /// which the cached credential is considered poisoned.
    pub restart_threshold: u32,
    /// Seconds to wait between invalidating the credential and forcing a
    /// refresh.
    pub credential_cooldown_secs: u64,
    /// Active-member count above which stale members get evicted.
    pub large_session_threshold: u32,
    /// Seconds a member may sit in a large session before eviction.
    pub member_grace_secs: u64,
    /// Restart automatically when the real-time channel closes or errors.
    pub auto_restart: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            service_config_id: MINECRAFT_SCID.to_string(),
            template_name: MINECRAFT_TEMPLATE.to_string(),
            heartbeat_interval_ms: 27_600,
            restart_threshold: 5,
            credential_cooldown_secs: 29,
            large_session_threshold: 35,
            member_grace_secs: 300,
            auto_restart: true,
        }
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn credential_cooldown(&self) -> Duration {
        Duration::from_secs(self.credential_cooldown_secs)
    }

    pub fn member_grace(&self) -> Duration {
        Duration::from_secs(self.member_grace_secs)
    }
}
