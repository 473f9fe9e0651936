//! Session documents: what we PUT to the session directory and what it
//! sends back.
//!
//! The outbound side is built with [`SessionDocument::builder`], which
//! takes the member record up front so a document can never be sent
//! without one. The advertised world data comes from [`SessionContent`],
//! the only part of the document that changes between heartbeats.
//!
//! The inbound side ([`SessionSnapshot`]) is deliberately loose: the
//! directory returns a large document and we only read the member roster.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConnectionId, SessionReference, Xuid};

/// Subscription id sent in every member record. Any stable GUID works;
/// the directory only uses it to route change notifications back to us.
pub const MEMBER_SUBSCRIPTION_ID: &str = "845CC784-7348-4A27-BCDE-C083579DD113";

// ---------------------------------------------------------------------------
// JoinPolicy
// ---------------------------------------------------------------------------

/// Who may see and join the advertised session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Friends and friends of friends see the world in their list.
    #[default]
    FriendsOfFriends,
    /// Only direct friends of the host see the world.
    FriendsOnly,
    /// Nobody sees the world without an invite.
    InviteOnly,
}

impl JoinPolicy {
    /// Value of the custom `Joinability` property.
    pub fn joinability(self) -> &'static str {
        match self {
            Self::FriendsOfFriends | Self::FriendsOnly => "joinable_by_friends",
            Self::InviteOnly => "invite_only",
        }
    }

    /// Value of the custom `BroadcastSetting` property.
    pub fn broadcast_setting(self) -> u8 {
        match self {
            Self::FriendsOfFriends => 3,
            Self::FriendsOnly => 2,
            Self::InviteOnly => 1,
        }
    }

    /// Value of the system `joinRestriction` property.
    pub fn join_restriction(self) -> &'static str {
        match self {
            Self::FriendsOfFriends | Self::FriendsOnly => "followed",
            Self::InviteOnly => "local",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionContent
// ---------------------------------------------------------------------------

/// The mutable payload merged into the session on every heartbeat.
///
/// The orchestrator is the only writer (it refreshes the player counts and
/// world name from server pings); the presence manager only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContent {
    /// Name shown as the host of the world.
    pub host_name: String,
    /// Name of the world.
    pub world_name: String,
    /// Game version string, e.g. `1.21.50`.
    pub version: String,
    /// Network protocol number matching `version`.
    pub protocol: u32,
    /// Players currently online.
    pub member_count: u32,
    /// Player capacity.
    pub max_member_count: u32,
    /// Address clients connect to.
    pub ip: String,
    /// Port clients connect to.
    pub port: u16,
    /// Connection type advertised in `SupportedConnections`.
    pub connection_type: u32,
    /// Xuid of the account that owns the session.
    pub owner_xuid: Xuid,
    /// Visibility of the session.
    pub join_policy: JoinPolicy,
}

// ---------------------------------------------------------------------------
// Outbound document
// ---------------------------------------------------------------------------

/// One `SupportedConnections` entry: where clients should connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SupportedConnection {
    pub connection_type: u32,
    pub host_ip_address: String,
    pub host_port: u16,
    #[serde(rename = "RakNetGUID")]
    pub rak_net_guid: String,
}

/// `properties.system` of the session document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProperties {
    pub join_restriction: String,
    pub read_restriction: String,
    pub closed: bool,
}

/// `properties.custom` of the session document, the part Minecraft
/// clients read to render the world entry.
///
/// Most keys are PascalCase, but a handful are camelCase on the wire,
/// hence the per-field renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomProperties {
    pub broadcast_setting: u8,
    pub cross_play_disabled: bool,
    pub joinability: String,
    pub lan_game: bool,
    pub max_member_count: u32,
    pub member_count: u32,
    pub online_cross_platform_game: bool,
    pub supported_connections: Vec<SupportedConnection>,
    pub title_id: u32,
    pub transport_layer: u32,
    #[serde(rename = "levelId")]
    pub level_id: String,
    #[serde(rename = "hostName")]
    pub host_name: String,
    #[serde(rename = "ownerId")]
    pub owner_id: Xuid,
    #[serde(rename = "rakNetGUID")]
    pub rak_net_guid: String,
    #[serde(rename = "worldName")]
    pub world_name: String,
    #[serde(rename = "worldType")]
    pub world_type: String,
    pub protocol: u32,
    pub version: String,
}

impl From<&SessionContent> for CustomProperties {
    fn from(content: &SessionContent) -> Self {
        Self {
            broadcast_setting: content.join_policy.broadcast_setting(),
            cross_play_disabled: false,
            joinability: content.join_policy.joinability().to_string(),
            lan_game: true,
            max_member_count: content.max_member_count,
            member_count: content.member_count,
            online_cross_platform_game: true,
            supported_connections: vec![SupportedConnection {
                connection_type: content.connection_type,
                host_ip_address: content.ip.clone(),
                host_port: content.port,
                rak_net_guid: String::new(),
            }],
            title_id: 0,
            transport_layer: 0,
            level_id: "level".to_string(),
            host_name: content.host_name.clone(),
            owner_id: content.owner_xuid.clone(),
            rak_net_guid: String::new(),
            world_name: content.world_name.clone(),
            world_type: "Survival".to_string(),
            protocol: content.protocol,
            version: content.version.clone(),
        }
    }
}

/// `properties` of the session document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProperties {
    pub system: SystemProperties,
    pub custom: CustomProperties,
}

impl From<&SessionContent> for SessionProperties {
    fn from(content: &SessionContent) -> Self {
        Self {
            system: SystemProperties {
                join_restriction: content
                    .join_policy
                    .join_restriction()
                    .to_string(),
                read_restriction: "followed".to_string(),
                closed: false,
            },
            custom: CustomProperties::from(content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSystemConstants {
    pub xuid: Xuid,
    pub initialize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConstants {
    pub system: MemberSystemConstants,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub change_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSystemProperties {
    pub active: bool,
    pub connection: ConnectionId,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProperties {
    pub system: MemberSystemProperties,
}

/// The `members.me` record: "this caller is an active member bound to
/// this real-time connection".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub constants: MemberConstants,
    pub properties: MemberProperties,
}

impl MemberRecord {
    /// An active member record for `xuid` bound to `connection`.
    pub fn active(xuid: Xuid, connection: ConnectionId) -> Self {
        Self {
            constants: MemberConstants {
                system: MemberSystemConstants {
                    xuid,
                    initialize: true,
                },
            },
            properties: MemberProperties {
                system: MemberSystemProperties {
                    active: true,
                    connection,
                    subscription: Subscription {
                        id: MEMBER_SUBSCRIPTION_ID.to_string(),
                        change_types: vec!["everything".to_string()],
                    },
                },
            },
        }
    }

    /// The xuid this record names.
    pub fn xuid(&self) -> &Xuid {
        &self.constants.system.xuid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMembers {
    pub me: MemberRecord,
}

/// The body of a session PUT.
///
/// Without `properties` it is a membership-only update (used when a
/// non-host account joins); with them it is the full heartbeat document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub properties: Option<SessionProperties>,
    pub members: SessionMembers,
}

impl SessionDocument {
    /// Starts a document for the given member. The member record is the
    /// one field every PUT needs, so it is required up front.
    pub fn builder(member: MemberRecord) -> SessionDocumentBuilder {
        SessionDocumentBuilder {
            member,
            properties: None,
        }
    }
}

/// Builder for [`SessionDocument`].
#[derive(Debug, Clone)]
pub struct SessionDocumentBuilder {
    member: MemberRecord,
    properties: Option<SessionProperties>,
}

impl SessionDocumentBuilder {
    /// Adds the advertised world data.
    pub fn content(mut self, content: &SessionContent) -> Self {
        self.properties = Some(SessionProperties::from(content));
        self
    }

    /// Finishes the document.
    pub fn build(self) -> SessionDocument {
        SessionDocument {
            properties: self.properties,
            members: SessionMembers { me: self.member },
        }
    }
}

/// Body of `POST /handles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRequest {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "sessionRef")]
    pub session_ref: SessionReference,
}

impl HandleRequest {
    /// An activity handle pointing at `reference`.
    pub fn activity(reference: SessionReference) -> Self {
        Self {
            version: 1,
            kind: "activity".to_string(),
            session_ref: reference,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound snapshot
// ---------------------------------------------------------------------------

/// Roster summary the directory returns with every session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersInfo {
    #[serde(default)]
    pub first: u32,
    #[serde(default)]
    pub next: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub accepted: u32,
    #[serde(default)]
    pub active: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMemberSystem {
    #[serde(default)]
    pub xuid: Option<Xuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMemberConstants {
    #[serde(default)]
    pub system: SnapshotMemberSystem,
}

/// One member slot as returned by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    #[serde(default)]
    pub constants: SnapshotMemberConstants,
    #[serde(rename = "joinTime", default)]
    pub join_time: Option<DateTime<Utc>>,
}

impl MemberSnapshot {
    /// The member's xuid, when the directory included it.
    pub fn xuid(&self) -> Option<&Xuid> {
        self.constants.system.xuid.as_ref()
    }
}

/// The session document as the directory sees it after a PUT.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "membersInfo", default)]
    pub members_info: Option<MembersInfo>,
    /// Member slots keyed by their decimal slot index.
    #[serde(default)]
    pub members: BTreeMap<String, MemberSnapshot>,
}

impl SessionSnapshot {
    /// Number of active members, falling back to the total count and then
    /// to the size of the roster when the summary is missing.
    pub fn active_count(&self) -> u32 {
        match &self.members_info {
            Some(info) => info.active.unwrap_or(info.count),
            None => self.members.len() as u32,
        }
    }

    /// Iterates member slots with their numeric index. Keys that are not
    /// numbers (the directory never sends any) are skipped.
    pub fn indexed_members(
        &self,
    ) -> impl Iterator<Item = (u32, &MemberSnapshot)> {
        self.members
            .iter()
            .filter_map(|(key, member)| Some((key.parse().ok()?, member)))
    }
}
