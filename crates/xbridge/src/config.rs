//! Bridge configuration.
//!
//! Every struct has a `Default` and `#[serde(default)]`, so a JSON file
//! only needs the fields it changes. Reading the file (or the CLI and
//! environment) is the caller's job; [`BridgeConfig::from_json`] parses
//! what it read.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xbridge_protocol::JoinPolicy;
use xbridge_session::PresenceConfig;
use xbridge_social::SocialConfig;

use crate::BridgeError;

/// The external Bedrock server being advertised, and the values shown
/// until (or instead of) a successful ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub host_name: String,
    pub world_name: String,
    pub version: String,
    pub protocol: u32,
    pub players: u32,
    pub max_players: u32,
    /// Connection type in `SupportedConnections`. 6 is a direct
    /// UDP connection to `ip:port`.
    pub connection_type: u32,
    /// Always advertise `version`/`protocol` from here, never from pings.
    pub keep_version_and_protocol_constant: bool,
    pub join_policy: JoinPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 19132,
            host_name: "Bedrock Server".to_string(),
            world_name: "Bedrock level".to_string(),
            version: "1.21.50".to_string(),
            protocol: 766,
            players: 0,
            max_players: 40,
            connection_type: 6,
            keep_version_and_protocol_constant: false,
            join_policy: JoinPolicy::FriendsOfFriends,
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive. `RUST_LOG` wins when set.
    pub level: String,
    /// Append WARN and above to this file.
    pub error_log: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            error_log: None,
        }
    }
}

/// Top-level configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    /// Seconds between server pings.
    pub ping_interval_secs: u64,
    /// Seconds between friend reconciliation passes.
    pub reconcile_interval_secs: u64,
    /// Seconds between follower sweeps of each account.
    pub auto_friend_interval_secs: u64,
    /// Follow back followers and drop people who stopped following.
    pub auto_friending: bool,
    /// Refuse to run accounts that have unlocked achievements.
    pub achievement_gate: bool,
    /// Seconds to wait before re-checking an account whose achievement
    /// list could not be fetched.
    pub gate_retry_secs: u64,
    pub presence: PresenceConfig,
    pub social: SocialConfig,
    pub log: LogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ping_interval_secs: 30,
            reconcile_interval_secs: 300,
            auto_friend_interval_secs: 10,
            auto_friending: true,
            achievement_gate: true,
            gate_retry_secs: 10,
            presence: PresenceConfig::default(),
            social: SocialConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn auto_friend_interval(&self) -> Duration {
        Duration::from_secs(self.auto_friend_interval_secs)
    }

    pub fn gate_retry(&self) -> Duration {
        Duration::from_secs(self.gate_retry_secs)
    }
}
