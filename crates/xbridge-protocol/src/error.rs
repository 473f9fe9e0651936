//! Error types for the protocol layer.

/// Errors that can occur while decoding frames and payloads.
///
/// Encoding never fails for the typed documents in this crate, so only
/// the inbound direction has variants.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes were not valid JSON for the expected shape.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message parsed but breaks the protocol, e.g. a connection-id
    /// notification with no id in it or a truncated pong.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
