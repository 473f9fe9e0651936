use std::fmt;

use xbridge_protocol::Xuid;

/// Why a friend edge was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalReason {
    /// The other side no longer follows the account.
    OneSided,
    /// Another managed account, initialized earlier, already owns it.
    Duplicate { owner: Xuid },
    /// Listed as a follower but not following any more (auto-friend sweep).
    Unfollowed,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneSided => write!(f, "one-sided"),
            Self::Duplicate { owner } => write!(f, "duplicate of {owner}"),
            Self::Unfollowed => write!(f, "unfollowed"),
        }
    }
}

/// Notifications published by the friend reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialEvent {
    FriendAdded {
        account: Xuid,
        friend: Xuid,
    },
    FriendRemoved {
        account: Xuid,
        friend: Xuid,
        reason: RemovalReason,
    },
    /// The account reached friend capacity and is no longer mutated.
    AccountFull { account: Xuid },
    /// A previously full account dropped below capacity.
    AccountAvailable { account: Xuid },
}
