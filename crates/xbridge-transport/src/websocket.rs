//! WebSocket channel to the real-time activity service.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{RealtimeChannel, RealtimeConnector, TransportError};

/// Production endpoint of the real-time activity service.
pub const RTA_URL: &str = "wss://rta.xboxlive.com/connect";

/// Sub-protocol the RTA service expects on the upgrade.
const SUB_PROTOCOL: &str = "echo-protocol";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`RealtimeConnector`] that dials a WebSocket URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Connector for an arbitrary URL (tests point this at a local server).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Connector for the production RTA endpoint.
    pub fn rta() -> Self {
        Self::new(RTA_URL)
    }

    /// The URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::rta()
    }
}

impl RealtimeConnector for WebSocketConnector {
    type Channel = WebSocketChannel;

    async fn connect(
        &self,
        authorization: &str,
    ) -> Result<Self::Channel, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let auth = HeaderValue::from_str(authorization).map_err(|e| {
            TransportError::ConnectFailed(format!("bad authorization header: {e}"))
        })?;
        let headers = request.headers_mut();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SUB_PROTOCOL),
        );

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!(url = %self.url, "real-time channel open");

        let (sink, stream) = ws.split();
        Ok(WebSocketChannel {
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        })
    }
}

/// A live WebSocket connection.
///
/// The stream is split so a pending `recv` never blocks a `send`.
pub struct WebSocketChannel {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
}

impl RealtimeChannel for WebSocketChannel {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "real-time channel closed by peer");
                    return Ok(None);
                }
                None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}
