//! # xbridge
//!
//! Makes a Minecraft Bedrock dedicated server show up in the friends list
//! of Xbox players, by advertising it through one or more Xbox Live
//! accounts.
//!
//! The [`Orchestrator`] ties the layers together:
//!
//! - `xbridge-directory`: tokens and REST calls;
//! - `xbridge-session`: the host's MPSD session and its real-time channel;
//! - `xbridge-social`: friend reconciliation across the managed accounts;
//! - `xbridge-transport`: WebSocket and Bedrock ping clients.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xbridge::prelude::*;
//!
//! let config = BridgeConfig::from_json(&std::fs::read_to_string("xbridge.json")?)?;
//! xbridge::logging::init(&config.log)?;
//! let (orchestrator, handle, events) = Orchestrator::new(
//!     config,
//!     Arc::new(XboxDirectoryClient::new()),
//!     Arc::new(WebSocketConnector::rta()),
//!     Arc::new(BedrockPinger::default()),
//!     accounts,
//! );
//! orchestrator.run().await
//! ```

mod config;
mod content;
mod error;
pub mod logging;
mod orchestrator;

pub use config::{BridgeConfig, LogConfig, ServerConfig};
pub use content::{apply_server_info, initial_content};
pub use error::BridgeError;
pub use orchestrator::{
    Orchestrator, OrchestratorEvent, OrchestratorEvents, OrchestratorHandle, StartupStage,
};

pub mod prelude {
    pub use crate::{
        BridgeConfig, BridgeError, Orchestrator, OrchestratorEvent, OrchestratorHandle,
        ServerConfig, StartupStage,
    };
    pub use xbridge_directory::{
        DirectoryClient, StaticTokenProvider, TokenProvider, XboxDirectoryClient,
    };
    pub use xbridge_protocol::{JoinPolicy, SessionContent, Xuid};
    pub use xbridge_session::{PresenceConfig, PresenceEvent};
    pub use xbridge_social::{SocialConfig, SocialEvent};
    pub use xbridge_transport::{BedrockPinger, ServerInfoProvider, WebSocketConnector};
}
