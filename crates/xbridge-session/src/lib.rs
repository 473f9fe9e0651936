//! Session presence for xbridge.
//!
//! Keeps exactly one MPSD session alive for a host account, bound to a
//! live real-time connection:
//!
//! 1. open the RTA channel and subscribe to the connection feed;
//! 2. wait for the connection id;
//! 3. PUT the session document on every heartbeat while connected;
//! 4. set the activity handle after the first successful PUT of each
//!    session, then join the other managed accounts;
//! 5. restart on close or error, and after too many failed starts in a
//!    row discard the cached credential and force a refresh.
//!
//! The decisions live in the sans-IO [`PresenceMachine`]; the
//! [`PresenceManager`] spawns the actor that performs them.

mod config;
mod error;
mod event;
mod machine;
mod presence;

pub use config::{PresenceConfig, MINECRAFT_SCID, MINECRAFT_TEMPLATE};
pub use error::PresenceError;
pub use event::PresenceEvent;
pub use machine::{ConnectionState, PresenceAction, PresenceInput, PresenceMachine};
pub use presence::{
    ContentSource, PresenceEvents, PresenceHandle, PresenceManager, PresenceStatus,
};
