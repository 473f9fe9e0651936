//! Building and refreshing the advertised [`SessionContent`].

use xbridge_protocol::{ServerInfo, SessionContent, Xuid};

use crate::ServerConfig;

/// The content advertised before any ping succeeded.
pub fn initial_content(server: &ServerConfig, owner: Xuid) -> SessionContent {
    SessionContent {
        host_name: server.host_name.clone(),
        world_name: server.world_name.clone(),
        version: server.version.clone(),
        protocol: server.protocol,
        member_count: server.players,
        max_member_count: server.max_players,
        ip: server.ip.clone(),
        port: server.port,
        connection_type: server.connection_type,
        owner_xuid: owner,
        join_policy: server.join_policy,
    }
}

/// Merges a ping result into `content`.
///
/// Names and the address always come from configuration. Version and
/// protocol come from the ping unless pinned. A capacity of zero is not
/// believed.
pub fn apply_server_info(content: &mut SessionContent, info: &ServerInfo, server: &ServerConfig) {
    content.member_count = info.players_online;
    if info.players_max > 0 {
        content.max_member_count = info.players_max;
    }
    if server.keep_version_and_protocol_constant {
        content.version = server.version.clone();
        content.protocol = server.protocol;
    } else {
        content.version = info.version.clone();
        content.protocol = info.protocol;
    }
}
