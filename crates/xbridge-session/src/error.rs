//! Error types for the presence layer.

/// Errors returned by [`PresenceManager`](crate::PresenceManager) and
/// [`PresenceHandle`](crate::PresenceHandle).
///
/// Network failures never show up here: the actor logs them and retries
/// on its own schedule.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The host account has no token yet, so we do not know its xuid.
    #[error("host account has no credential")]
    NoCredential,

    /// The presence actor has stopped.
    #[error("presence manager is not running")]
    Unavailable,
}
