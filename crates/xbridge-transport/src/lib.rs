//! Transport layer for xbridge.
//!
//! Two kinds of network traffic leave the bridge outside of plain HTTP:
//!
//! - the **real-time channel**, a WebSocket to the RTA service that tells
//!   us our connection id ([`RealtimeConnector`], [`RealtimeChannel`]);
//! - the **server ping**, a RakNet unconnected ping to the Bedrock server
//!   we advertise ([`ServerInfoProvider`]).
//!
//! Both are traits so the session and orchestrator crates can be driven by
//! in-memory fakes in tests.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket channel via `tokio-tungstenite`

mod error;
mod ping;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use ping::BedrockPinger;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector, RTA_URL};

use std::future::Future;

use xbridge_protocol::ServerInfo;

/// Opens real-time channels.
///
/// One presence manager owns one connector and calls [`connect`] every time
/// it (re)starts.
///
/// [`connect`]: RealtimeConnector::connect
pub trait RealtimeConnector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: RealtimeChannel;

    /// Opens a channel, presenting `authorization` on the upgrade request.
    fn connect(
        &self,
        authorization: &str,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A single real-time connection that exchanges text frames.
pub trait RealtimeChannel: Send + Sync + 'static {
    /// Sends one text frame.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next text frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Asks the advertised game server what it is currently running.
pub trait ServerInfoProvider: Send + Sync + 'static {
    /// Pings `host:port`. Fails with a transport error when unreachable.
    fn ping(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<ServerInfo, TransportError>> + Send;
}
