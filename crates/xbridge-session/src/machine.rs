//! The presence state machine.
//!
//! [`PresenceMachine`] holds every decision the presence manager makes and
//! none of its I/O. It consumes [`PresenceInput`]s one at a time (a channel
//! opened, a connection id arrived, a heartbeat tick fired, a PUT came
//! back) and answers with [`PresenceAction`]s for the actor to carry out.
//! The actor feeds the outcome of each action back in as another input.
//!
//! ```text
//!                 start()
//!   Disconnected ─────────→ (dialing) ──open──→ Connecting ──connection id──→ Connected
//!        ↑                      │                   │                           │
//!        └──────────────────────┴────── close / error ──────────────────────────┘
//! ```
//!
//! Every channel the machine asks for is tagged with a generation number.
//! Inputs from an older generation are dropped, so a late close from a
//! channel we already gave up on can never knock down its successor.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use xbridge_protocol::{ConnectionId, SessionReference, SessionSnapshot, Xuid};

use crate::{PresenceConfig, PresenceEvent};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the real-time connection is.
///
/// - **Disconnected**: no channel, or a channel that is still dialing.
/// - **Connecting**: the channel is open and subscribed, but the
///   connection id has not arrived.
/// - **Connected**: we hold a connection id and may write the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Forward moves go one step at a time; falling back to
    /// `Disconnected` is allowed from anywhere.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connected, Self::Connected)
                | (_, Self::Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs and actions
// ---------------------------------------------------------------------------

/// Everything that can happen to the presence manager.
#[derive(Debug, Clone)]
pub enum PresenceInput {
    /// Someone asked for a (re)start.
    StartRequested,
    /// The channel for `generation` is open and the subscribe frame went out.
    ChannelOpened { generation: u64 },
    /// The connection-id notification arrived.
    ConnectionIdReceived {
        generation: u64,
        connection: ConnectionId,
    },
    /// The channel failed to open, errored, or closed.
    ChannelClosed {
        generation: u64,
        reason: Option<String>,
    },
    /// The heartbeat timer fired.
    HeartbeatTick { token_refreshing: bool },
    /// A session PUT succeeded. `observed_at` is the wall-clock time used
    /// to judge member join times.
    SessionPutSucceeded {
        generation: u64,
        snapshot: SessionSnapshot,
        observed_at: DateTime<Utc>,
    },
    /// A session PUT failed.
    SessionPutFailed { generation: u64, error: String },
    /// The host's activity handle call finished.
    HandleSet { generation: u64, ok: bool },
    /// A managed account should be joined to the session.
    JoinRequested { xuid: Xuid },
    /// A member join (membership PUT plus handle) finished.
    MemberJoinFinished {
        generation: u64,
        xuid: Xuid,
        ok: bool,
    },
    /// The forced credential refresh after a cool-down finished.
    CredentialRefreshed { ok: bool },
}

/// Side effects the actor must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceAction {
    /// Dial a new real-time channel and send the subscribe frame.
    OpenChannel { generation: u64 },
    /// PUT the full session document as the host.
    PutSession {
        generation: u64,
        reference: SessionReference,
        connection: ConnectionId,
    },
    /// Point the host's activity handle at the session.
    SetActivityHandle {
        generation: u64,
        reference: SessionReference,
    },
    /// PUT a membership for `xuid`, then set its activity handle.
    JoinMember {
        generation: u64,
        xuid: Xuid,
        reference: SessionReference,
        connection: ConnectionId,
    },
    /// Read the session as `xuid` to keep its membership alive.
    KeepAlive {
        xuid: Xuid,
        reference: SessionReference,
    },
    /// Evict the member in slot `index`.
    RemoveMember {
        reference: SessionReference,
        index: u32,
        xuid: Option<Xuid>,
    },
    /// Drop the host's cached secondary credential.
    InvalidateCredential,
    /// Force a credential refresh after `after`, then report
    /// [`PresenceInput::CredentialRefreshed`].
    RefreshCredential { after: Duration },
    /// Publish an event.
    Emit(PresenceEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberStatus {
    /// Waiting for the session to exist (or for a retry).
    Pending,
    /// Joined the current generation's session.
    Joined,
}

// ---------------------------------------------------------------------------
// PresenceMachine
// ---------------------------------------------------------------------------

/// Sans-IO core of the presence manager.
#[derive(Debug)]
pub struct PresenceMachine {
    config: PresenceConfig,
    host: Xuid,
    state: ConnectionState,
    generation: u64,
    reference: Option<SessionReference>,
    connection: Option<ConnectionId>,
    /// A channel has been requested but has not opened or failed yet.
    dialing: bool,
    /// Start attempts since we last reached `Connected`.
    restart_attempts: u32,
    /// Waiting out the cool-down before a forced refresh.
    cooling_down: bool,
    handle_set: bool,
    handle_pending: bool,
    /// The current generation's session has been seen in a PUT response.
    session_observed: bool,
    members: BTreeMap<Xuid, MemberStatus>,
}

impl PresenceMachine {
    pub fn new(config: PresenceConfig, host: Xuid) -> Self {
        Self {
            config,
            host,
            state: ConnectionState::Disconnected,
            generation: 0,
            reference: None,
            connection: None,
            dialing: false,
            restart_attempts: 0,
            cooling_down: false,
            handle_set: false,
            handle_pending: false,
            session_observed: false,
            members: BTreeMap::new(),
        }
    }

    /// Processes one input and returns the actions it calls for, in order.
    pub fn handle(&mut self, input: PresenceInput) -> Vec<PresenceAction> {
        let mut out = Vec::new();
        match input {
            PresenceInput::StartRequested => self.start(&mut out),
            PresenceInput::ChannelOpened { generation } => {
                if self.is_current(generation) && self.dialing {
                    self.dialing = false;
                    self.transition(ConnectionState::Connecting, &mut out);
                }
            }
            PresenceInput::ConnectionIdReceived {
                generation,
                connection,
            } => self.on_connection_id(generation, connection, &mut out),
            PresenceInput::ChannelClosed { generation, reason } => {
                self.on_closed(generation, reason, &mut out)
            }
            PresenceInput::HeartbeatTick { token_refreshing } => {
                if self.state.is_connected() && !token_refreshing {
                    self.heartbeat(&mut out);
                }
            }
            PresenceInput::SessionPutSucceeded {
                generation,
                snapshot,
                observed_at,
            } => self.on_put(generation, &snapshot, observed_at, &mut out),
            PresenceInput::SessionPutFailed { .. } => {}
            PresenceInput::HandleSet { generation, ok } => {
                if self.is_current(generation) {
                    self.handle_pending = false;
                    if ok && !self.handle_set {
                        self.handle_set = true;
                        if let Some(reference) = &self.reference {
                            out.push(PresenceAction::Emit(PresenceEvent::Joined {
                                reference: reference.clone(),
                            }));
                        }
                    }
                }
            }
            PresenceInput::JoinRequested { xuid } => self.on_join(xuid, &mut out),
            PresenceInput::MemberJoinFinished {
                generation,
                xuid,
                ok,
            } => {
                if self.is_current(generation) && ok {
                    if let Some(status) = self.members.get_mut(&xuid) {
                        *status = MemberStatus::Joined;
                        out.push(PresenceAction::Emit(PresenceEvent::MemberJoined {
                            xuid,
                        }));
                    }
                }
            }
            PresenceInput::CredentialRefreshed { ok } => {
                self.cooling_down = false;
                out.push(PresenceAction::Emit(PresenceEvent::CredentialRefreshed {
                    ok,
                }));
                self.start(&mut out);
            }
        }
        out
    }

    // -- transitions ------------------------------------------------------

    fn start(&mut self, out: &mut Vec<PresenceAction>) {
        if self.cooling_down
            || self.dialing
            || self.state != ConnectionState::Disconnected
        {
            return;
        }

        if self.restart_attempts >= self.config.restart_threshold {
            self.restart_attempts = 0;
            self.cooling_down = true;
            out.push(PresenceAction::InvalidateCredential);
            out.push(PresenceAction::RefreshCredential {
                after: self.config.credential_cooldown(),
            });
            out.push(PresenceAction::Emit(PresenceEvent::CredentialInvalidated));
            return;
        }

        self.restart_attempts += 1;
        self.generation += 1;
        self.reference = Some(SessionReference::new(
            self.config.service_config_id.clone(),
            self.config.template_name.clone(),
            Uuid::new_v4().to_string(),
        ));
        self.connection = None;
        self.handle_set = false;
        self.handle_pending = false;
        self.session_observed = false;
        for status in self.members.values_mut() {
            *status = MemberStatus::Pending;
        }
        self.dialing = true;
        out.push(PresenceAction::OpenChannel {
            generation: self.generation,
        });
    }

    fn on_connection_id(
        &mut self,
        generation: u64,
        connection: ConnectionId,
        out: &mut Vec<PresenceAction>,
    ) {
        if !self.is_current(generation)
            || self.state == ConnectionState::Disconnected
        {
            return;
        }
        self.connection = Some(connection);
        self.restart_attempts = 0;
        self.transition(ConnectionState::Connected, out);
        self.heartbeat(out);
    }

    fn on_closed(
        &mut self,
        generation: u64,
        reason: Option<String>,
        out: &mut Vec<PresenceAction>,
    ) {
        if !self.is_current(generation) {
            return;
        }
        if !self.dialing && self.state == ConnectionState::Disconnected {
            return;
        }
        self.dialing = false;
        self.connection = None;
        self.transition(ConnectionState::Disconnected, out);
        out.push(PresenceAction::Emit(PresenceEvent::ChannelLost { reason }));
        if self.config.auto_restart {
            self.start(out);
        }
    }

    fn heartbeat(&mut self, out: &mut Vec<PresenceAction>) {
        let (Some(reference), Some(connection)) = (&self.reference, &self.connection)
        else {
            return;
        };
        out.push(PresenceAction::PutSession {
            generation: self.generation,
            reference: reference.clone(),
            connection: connection.clone(),
        });
        for (xuid, status) in &self.members {
            match status {
                MemberStatus::Joined => out.push(PresenceAction::KeepAlive {
                    xuid: xuid.clone(),
                    reference: reference.clone(),
                }),
                MemberStatus::Pending if self.session_observed => {
                    out.push(PresenceAction::JoinMember {
                        generation: self.generation,
                        xuid: xuid.clone(),
                        reference: reference.clone(),
                        connection: connection.clone(),
                    })
                }
                MemberStatus::Pending => {}
            }
        }
    }

    fn on_put(
        &mut self,
        generation: u64,
        snapshot: &SessionSnapshot,
        observed_at: DateTime<Utc>,
        out: &mut Vec<PresenceAction>,
    ) {
        if !self.is_current(generation) || !self.state.is_connected() {
            return;
        }
        let (Some(reference), Some(connection)) =
            (self.reference.clone(), self.connection.clone())
        else {
            return;
        };

        out.push(PresenceAction::Emit(PresenceEvent::SessionUpdated {
            reference: reference.clone(),
            active_members: snapshot.active_count(),
        }));

        if !self.handle_set && !self.handle_pending {
            self.handle_pending = true;
            out.push(PresenceAction::SetActivityHandle {
                generation,
                reference: reference.clone(),
            });
        }

        if !self.session_observed {
            self.session_observed = true;
            for (xuid, status) in &self.members {
                if *status == MemberStatus::Pending {
                    out.push(PresenceAction::JoinMember {
                        generation,
                        xuid: xuid.clone(),
                        reference: reference.clone(),
                        connection: connection.clone(),
                    });
                }
            }
        }

        out.extend(self.evictions(&reference, snapshot, observed_at));
    }

    fn on_join(&mut self, xuid: Xuid, out: &mut Vec<PresenceAction>) {
        if xuid == self.host || self.members.contains_key(&xuid) {
            return;
        }
        self.members.insert(xuid.clone(), MemberStatus::Pending);
        if let (true, Some(reference), Some(connection)) = (
            self.state.is_connected() && self.session_observed,
            &self.reference,
            &self.connection,
        ) {
            out.push(PresenceAction::JoinMember {
                generation: self.generation,
                xuid,
                reference: reference.clone(),
                connection: connection.clone(),
            });
        }
    }

    /// Members to evict from an oversized session.
    ///
    /// Only sessions with more active members than the large-session
    /// threshold are pruned, and only members whose join time is older
    /// than the grace window. Managed accounts are never evicted, and
    /// neither are members without a join time.
    fn evictions(
        &self,
        reference: &SessionReference,
        snapshot: &SessionSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<PresenceAction> {
        if snapshot.active_count() <= self.config.large_session_threshold {
            return Vec::new();
        }
        let grace = chrono::Duration::from_std(self.config.member_grace())
            .unwrap_or(chrono::Duration::MAX);

        snapshot
            .indexed_members()
            .filter(|(_, member)| {
                member.xuid().is_none_or(|xuid| !self.is_managed(xuid))
            })
            .filter(|(_, member)| {
                member.join_time.is_some_and(|joined| now - joined > grace)
            })
            .map(|(index, member)| PresenceAction::RemoveMember {
                reference: reference.clone(),
                index,
                xuid: member.xuid().cloned(),
            })
            .collect()
    }

    fn transition(&mut self, target: ConnectionState, out: &mut Vec<PresenceAction>) {
        if self.state == target {
            return;
        }
        if !self.state.can_transition_to(target) {
            tracing::warn!(from = %self.state, to = %target, "unexpected presence transition");
        }
        self.state = target;
        out.push(PresenceAction::Emit(PresenceEvent::StateChanged(target)));
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn is_managed(&self, xuid: &Xuid) -> bool {
        *xuid == self.host || self.members.contains_key(xuid)
    }

    // -- accessors --------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn host(&self) -> &Xuid {
        &self.host
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current session, if a start has happened.
    pub fn reference(&self) -> Option<&SessionReference> {
        self.reference.as_ref()
    }

    pub fn connection(&self) -> Option<&ConnectionId> {
        self.connection.as_ref()
    }

    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooling_down
    }

    /// Whether the activity handle was set for the current session.
    pub fn handle_set(&self) -> bool {
        self.handle_set
    }

    /// Managed members and whether each has joined the current session.
    pub fn members(&self) -> impl Iterator<Item = (&Xuid, bool)> {
        self.members
            .iter()
            .map(|(xuid, status)| (xuid, *status == MemberStatus::Joined))
    }
}
