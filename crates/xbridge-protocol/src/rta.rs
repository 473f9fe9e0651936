//! Real-time activity (RTA) frames.
//!
//! The RTA socket speaks JSON arrays. We send exactly one frame, a
//! subscription to the session directory's connection feed, and care about
//! exactly one reply: the notification carrying our connection id, shaped
//! like `[1, 1, 0, "<uri>", {"ConnectionId": "..."}]`.

use serde_json::Value;

use crate::{ConnectionId, ProtocolError};

/// Feed that yields the connection id the session directory needs.
pub const CONNECTIONS_URI: &str =
    "https://sessiondirectory.xboxlive.com/connections/";

/// Position of the payload object inside a subscribe reply.
const PAYLOAD_INDEX: usize = 4;

/// The subscribe frame sent immediately after the socket opens.
pub fn subscribe_frame() -> String {
    serde_json::json!([1, 1, CONNECTIONS_URI]).to_string()
}

/// An inbound RTA frame, reduced to what the presence manager reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtaMessage {
    /// The connection-id notification for our subscription.
    ConnectionId(ConnectionId),
    /// Anything else (change notifications, acks). Ignored.
    Other,
}

impl RtaMessage {
    /// Classifies a text frame.
    ///
    /// A frame that mentions `ConnectionId` but does not carry one where
    /// expected is a protocol error; callers log it and keep their state.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if !text.contains("ConnectionId") {
            return Ok(Self::Other);
        }
        let frame: Value =
            serde_json::from_str(text).map_err(ProtocolError::Decode)?;
        frame
            .get(PAYLOAD_INDEX)
            .and_then(|payload| payload.get("ConnectionId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(|id| Self::ConnectionId(ConnectionId(id.to_string())))
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!(
                    "connection id notification without an id: {text}"
                ))
            })
    }
}
