//! Unified error type for xbridge.

use xbridge_directory::{DirectoryError, TokenError};
use xbridge_protocol::{ProtocolError, Xuid};
use xbridge_session::PresenceError;
use xbridge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Only a few of these ever stop the orchestrator: a missing first token,
/// an account that fails the achievement gate, and bad configuration.
/// Network errors are logged where they happen and the affected tick is
/// skipped.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An account carries unlocked achievements and must not be automated.
    #[error("account {xuid} has {count} unlocked achievement(s); use an account without achievements")]
    AchievementsUnlocked { xuid: Xuid, count: usize },

    /// No accounts were configured.
    #[error("no accounts configured")]
    NoAccounts,

    /// The orchestrator was stopped before the session came up.
    #[error("orchestrator stopped")]
    Stopped,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The error log could not be opened.
    #[error("error log: {0}")]
    Io(#[from] std::io::Error),

    /// A global tracing subscriber was already installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}
