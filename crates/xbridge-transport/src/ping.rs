//! Bedrock server ping over UDP.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use xbridge_protocol::{decode_pong, encode_ping, ServerInfo};

use crate::{ServerInfoProvider, TransportError};

/// Largest pong we accept. Advertisements are a few hundred bytes.
const MAX_PONG_LEN: usize = 2048;

/// A [`ServerInfoProvider`] speaking RakNet's unconnected ping.
#[derive(Debug, Clone)]
pub struct BedrockPinger {
    timeout: Duration,
    client_guid: u64,
}

impl BedrockPinger {
    /// A pinger that waits at most `timeout` for the pong.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client_guid: rand::random(),
        }
    }

    async fn exchange(
        &self,
        host: &str,
        port: u16,
    ) -> Result<ServerInfo, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        socket
            .connect((host, port))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        socket
            .send(&encode_ping(now, self.client_guid))
            .await
            .map_err(TransportError::SendFailed)?;

        let mut buf = [0u8; MAX_PONG_LEN];
        let len = socket
            .recv(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        Ok(decode_pong(&buf[..len])?)
    }
}

impl Default for BedrockPinger {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ServerInfoProvider for BedrockPinger {
    async fn ping(
        &self,
        host: &str,
        port: u16,
    ) -> Result<ServerInfo, TransportError> {
        match tokio::time::timeout(self.timeout, self.exchange(host, port)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
