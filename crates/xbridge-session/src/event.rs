use xbridge_protocol::{SessionReference, Xuid};

use crate::ConnectionState;

/// Notifications published by a presence manager.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// The real-time connection moved to a new state.
    StateChanged(ConnectionState),
    /// The real-time channel failed to open, errored, or closed.
    ChannelLost { reason: Option<String> },
    /// A session PUT succeeded.
    SessionUpdated {
        reference: SessionReference,
        active_members: u32,
    },
    /// The host's activity handle now points at `reference`.
    Joined { reference: SessionReference },
    /// A managed account joined the session.
    MemberJoined { xuid: Xuid },
    /// A stale member was evicted from a large session.
    MemberEvicted { index: u32, xuid: Option<Xuid> },
    /// Too many failed starts; the cached credential was discarded.
    CredentialInvalidated,
    /// The forced credential refresh finished.
    CredentialRefreshed { ok: bool },
}
