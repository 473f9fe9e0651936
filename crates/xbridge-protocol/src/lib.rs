//! Wire types for xbridge.
//!
//! This crate defines everything that crosses the network:
//!
//! - **Identity** ([`Xuid`], [`SessionReference`], [`ConnectionId`])
//! - **Session documents** ([`SessionDocument`] built from
//!   [`SessionContent`], and the [`SessionSnapshot`] the directory returns)
//! - **Social payloads** ([`PeopleList`], [`Achievement`])
//! - **Real-time frames** ([`RtaMessage`], [`subscribe_frame`])
//! - **Bedrock pings** ([`encode_ping`], [`decode_pong`], [`ServerInfo`])
//!
//! It does no I/O. The transport and directory crates move these types
//! over sockets and HTTP.

mod error;
mod pong;
mod rta;
mod session;
mod social;
mod types;

pub use error::ProtocolError;
pub use pong::{
    decode_pong, encode_ping, ServerInfo, OFFLINE_MESSAGE_MAGIC,
    UNCONNECTED_PING, UNCONNECTED_PONG,
};
pub use rta::{subscribe_frame, RtaMessage, CONNECTIONS_URI};
pub use session::{
    CustomProperties, HandleRequest, JoinPolicy, MemberRecord, MemberSnapshot,
    MembersInfo, SessionContent, SessionDocument, SessionDocumentBuilder,
    SessionProperties, SessionSnapshot, SnapshotMemberConstants,
    SnapshotMemberSystem, SupportedConnection, SystemProperties,
    MEMBER_SUBSCRIPTION_ID,
};
pub use social::{Achievement, AchievementList, PeopleList, Person, ProgressState};
pub use types::{ConnectionId, SessionReference, Xuid};
