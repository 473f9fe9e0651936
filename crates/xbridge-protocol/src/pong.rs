//! Bedrock "unconnected ping" packets.
//!
//! Bedrock servers answer a RakNet unconnected ping with a pong whose
//! payload is a `;`-separated advertisement string:
//!
//! ```text
//! MCPE;<motd>;<protocol>;<version>;<online>;<max>;<server id>;<world>;<gamemode>;...
//! ```
//!
//! This module only encodes and decodes the packets; the UDP exchange
//! lives in the transport crate.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Packet id of an unconnected ping.
pub const UNCONNECTED_PING: u8 = 0x01;
/// Packet id of an unconnected pong.
pub const UNCONNECTED_PONG: u8 = 0x1c;
/// RakNet's offline-message magic.
pub const OFFLINE_MESSAGE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd,
    0x12, 0x34, 0x56, 0x78,
];

/// id + timestamp + server guid + magic + string length.
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16 + 2;

/// What a Bedrock server advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub motd: String,
    pub version: String,
    pub protocol: u32,
    pub players_online: u32,
    pub players_max: u32,
    pub world_name: String,
    pub gamemode: String,
}

/// Encodes an unconnected ping.
pub fn encode_ping(timestamp_ms: u64, client_guid: u64) -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + 8 + 16 + 8);
    packet.push(UNCONNECTED_PING);
    packet.extend_from_slice(&timestamp_ms.to_be_bytes());
    packet.extend_from_slice(&OFFLINE_MESSAGE_MAGIC);
    packet.extend_from_slice(&client_guid.to_be_bytes());
    packet
}

/// Decodes an unconnected pong into a [`ServerInfo`].
pub fn decode_pong(packet: &[u8]) -> Result<ServerInfo, ProtocolError> {
    if packet.len() < PONG_HEADER_LEN {
        return Err(ProtocolError::InvalidMessage(format!(
            "pong too short: {} bytes",
            packet.len()
        )));
    }
    if packet[0] != UNCONNECTED_PONG {
        return Err(ProtocolError::InvalidMessage(format!(
            "unexpected packet id {:#04x}",
            packet[0]
        )));
    }
    if packet[17..33] != OFFLINE_MESSAGE_MAGIC {
        return Err(ProtocolError::InvalidMessage(
            "pong without offline magic".into(),
        ));
    }

    let declared = u16::from_be_bytes([packet[33], packet[34]]) as usize;
    let body = &packet[PONG_HEADER_LEN..];
    let body = &body[..declared.min(body.len())];
    let advertisement = String::from_utf8_lossy(body);

    let parts: Vec<&str> = advertisement.split(';').collect();
    if parts.len() < 6 {
        return Err(ProtocolError::InvalidMessage(format!(
            "advertisement has {} fields, expected at least 6",
            parts.len()
        )));
    }

    let number = |index: usize| -> Result<u32, ProtocolError> {
        parts[index].trim().parse().map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "advertisement field {index} is not a number: {:?}",
                parts[index]
            ))
        })
    };
    let text = |index: usize| parts.get(index).copied().unwrap_or_default().to_string();

    Ok(ServerInfo {
        motd: text(1),
        protocol: number(2)?,
        version: text(3),
        players_online: number(4)?,
        players_max: number(5)?,
        world_name: text(7),
        gamemode: text(8),
    })
}
