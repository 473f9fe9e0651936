//! Presence actor: the Tokio task that carries out what the
//! [`PresenceMachine`] decides.
//!
//! One actor per host account. It owns the machine, the heartbeat timer,
//! the real-time channel task and the accounts joined to the session, and
//! talks to the outside world through a command channel
//! ([`PresenceHandle`]) and an event channel ([`PresenceEvents`]).
//!
//! Directory calls are awaited inline, one action at a time, so the
//! machine never sees two inputs interleave. The channel reader and the
//! credential cool-down run as separate tasks and report back through the
//! actor's input queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use xbridge_directory::{DirectoryClient, TokenProvider};
use xbridge_protocol::{
    subscribe_frame, ConnectionId, MemberRecord, RtaMessage, SessionContent,
    SessionDocument, SessionReference, Xuid,
};
use xbridge_tick::TickScheduler;
use xbridge_transport::{RealtimeChannel, RealtimeConnector};

use crate::{
    ConnectionState, PresenceAction, PresenceConfig, PresenceError, PresenceEvent,
    PresenceInput, PresenceMachine,
};

/// Receiving end of a presence manager's events.
pub type PresenceEvents = mpsc::UnboundedReceiver<PresenceEvent>;

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

/// Where the advertised world data comes from.
///
/// Read on every heartbeat, right before the session PUT.
pub trait ContentSource: Send + 'static {
    fn current(&mut self) -> SessionContent;
}

/// The usual source: a watch channel the orchestrator writes ping results
/// into.
impl ContentSource for watch::Receiver<SessionContent> {
    fn current(&mut self) -> SessionContent {
        self.borrow_and_update().clone()
    }
}

/// Fixed content that never changes.
impl ContentSource for SessionContent {
    fn current(&mut self) -> SessionContent {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub(crate) enum PresenceCommand<T> {
    Start,
    Join { account: Arc<T> },
    GetStatus { reply: oneshot::Sender<PresenceStatus> },
    Shutdown,
}

/// A snapshot of the presence manager's state.
#[derive(Debug, Clone)]
pub struct PresenceStatus {
    pub state: ConnectionState,
    pub reference: Option<SessionReference>,
    pub generation: u64,
    pub restart_attempts: u32,
    pub handle_set: bool,
    /// Managed members and whether each joined the current session.
    pub members: Vec<(Xuid, bool)>,
}

/// Handle to a running presence actor. Cheap to clone.
pub struct PresenceHandle<T> {
    host: Xuid,
    sender: mpsc::Sender<PresenceCommand<T>>,
}

impl<T> Clone for PresenceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<T: TokenProvider> PresenceHandle<T> {
    /// The host account's xuid.
    pub fn host(&self) -> &Xuid {
        &self.host
    }

    /// Asks for a (re)start. A no-op while connected or connecting.
    pub async fn start(&self) -> Result<(), PresenceError> {
        self.sender
            .send(PresenceCommand::Start)
            .await
            .map_err(|_| PresenceError::Unavailable)
    }

    /// Joins a non-host account to the session. The join is issued once
    /// the session is known to exist and repeated after every restart.
    pub async fn join(&self, account: Arc<T>) -> Result<(), PresenceError> {
        self.sender
            .send(PresenceCommand::Join { account })
            .await
            .map_err(|_| PresenceError::Unavailable)
    }

    pub async fn status(&self) -> Result<PresenceStatus, PresenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(PresenceCommand::GetStatus { reply: reply_tx })
            .await
            .map_err(|_| PresenceError::Unavailable)?;
        reply_rx.await.map_err(|_| PresenceError::Unavailable)
    }

    /// Stops the actor and closes the real-time channel.
    pub async fn shutdown(&self) -> Result<(), PresenceError> {
        self.sender
            .send(PresenceCommand::Shutdown)
            .await
            .map_err(|_| PresenceError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// PresenceManager
// ---------------------------------------------------------------------------

/// Everything a presence actor needs, gathered before it is spawned.
pub struct PresenceManager<D, R, T, C> {
    config: PresenceConfig,
    host: Arc<T>,
    directory: Arc<D>,
    connector: Arc<R>,
    content: C,
    channel_size: usize,
}

impl<D, R, T, C> PresenceManager<D, R, T, C>
where
    D: DirectoryClient,
    R: RealtimeConnector,
    T: TokenProvider,
    C: ContentSource + Sync,
{
    pub fn new(
        config: PresenceConfig,
        host: Arc<T>,
        directory: Arc<D>,
        connector: Arc<R>,
        content: C,
    ) -> Self {
        Self {
            config,
            host,
            directory,
            connector,
            content,
            channel_size: 32,
        }
    }

    /// Spawns the actor and starts it.
    ///
    /// Fails only when the host account has no xuid yet.
    pub fn spawn(self) -> Result<(PresenceHandle<T>, PresenceEvents), PresenceError> {
        let host_xuid = self.host.xuid().ok_or(PresenceError::NoCredential)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(self.channel_size);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let heartbeat = TickScheduler::every(self.config.heartbeat_interval());
        let actor = PresenceActor {
            machine: PresenceMachine::new(self.config, host_xuid.clone()),
            host: self.host,
            directory: self.directory,
            connector: self.connector,
            content: self.content,
            members: HashMap::new(),
            heartbeat,
            channel_task: None,
            commands: cmd_rx,
            inputs: input_rx,
            input_tx,
            events: event_tx,
        };
        tokio::spawn(actor.run());

        Ok((
            PresenceHandle {
                host: host_xuid,
                sender: cmd_tx,
            },
            event_rx,
        ))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct PresenceActor<D, R, T, C> {
    machine: PresenceMachine,
    host: Arc<T>,
    directory: Arc<D>,
    connector: Arc<R>,
    content: C,
    /// Joined accounts by xuid, for their credentials.
    members: HashMap<Xuid, Arc<T>>,
    heartbeat: TickScheduler,
    channel_task: Option<JoinHandle<()>>,
    commands: mpsc::Receiver<PresenceCommand<T>>,
    inputs: mpsc::UnboundedReceiver<PresenceInput>,
    input_tx: mpsc::UnboundedSender<PresenceInput>,
    events: mpsc::UnboundedSender<PresenceEvent>,
}

impl<D, R, T, C> PresenceActor<D, R, T, C>
where
    D: DirectoryClient,
    R: RealtimeConnector,
    T: TokenProvider,
    C: ContentSource,
{
    async fn run(mut self) {
        let host = self.machine.host().clone();
        tracing::info!(%host, "presence manager started");

        self.drive(PresenceInput::StartRequested).await;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(PresenceCommand::Start) => {
                        self.drive(PresenceInput::StartRequested).await;
                    }
                    Some(PresenceCommand::Join { account }) => {
                        let Some(xuid) = account.xuid() else {
                            tracing::warn!(%host, "join requested for an account without a token");
                            continue;
                        };
                        self.members.insert(xuid.clone(), account);
                        self.drive(PresenceInput::JoinRequested { xuid }).await;
                    }
                    Some(PresenceCommand::GetStatus { reply }) => {
                        let _ = reply.send(self.status());
                    }
                    Some(PresenceCommand::Shutdown) | None => break,
                },
                Some(input) = self.inputs.recv() => {
                    self.drive(input).await;
                }
                _ = self.heartbeat.wait_for_tick() => {
                    let token_refreshing = self.host.is_refreshing();
                    if token_refreshing {
                        tracing::debug!(%host, "heartbeat skipped, token refreshing");
                    }
                    self.drive(PresenceInput::HeartbeatTick { token_refreshing }).await;
                    self.heartbeat.record_tick_end();
                }
            }
        }

        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        tracing::info!(%host, "presence manager stopped");
    }

    /// Feeds `input` to the machine, runs the resulting actions, and keeps
    /// going until no follow-up inputs remain.
    async fn drive(&mut self, input: PresenceInput) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            for action in self.machine.handle(input) {
                if let Some(next) = self.execute(action).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, action: PresenceAction) -> Option<PresenceInput> {
        match action {
            PresenceAction::OpenChannel { generation } => self.open_channel(generation),
            PresenceAction::PutSession {
                generation,
                reference,
                connection,
            } => Some(self.put_session(generation, &reference, connection).await),
            PresenceAction::SetActivityHandle {
                generation,
                reference,
            } => {
                let ok = match self.host.authorization_header() {
                    Some(auth) => match self.directory.set_activity_handle(&auth, &reference).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(session = %reference, error = %e, "activity handle failed");
                            false
                        }
                    },
                    None => false,
                };
                Some(PresenceInput::HandleSet { generation, ok })
            }
            PresenceAction::JoinMember {
                generation,
                xuid,
                reference,
                connection,
            } => {
                let ok = self.join_member(&xuid, &reference, connection).await;
                Some(PresenceInput::MemberJoinFinished {
                    generation,
                    xuid,
                    ok,
                })
            }
            PresenceAction::KeepAlive { xuid, reference } => {
                let auth = self
                    .members
                    .get(&xuid)
                    .and_then(|account| account.authorization_header());
                if let Some(auth) = auth {
                    if let Err(e) = self.directory.session_keep_alive(&auth, &reference).await {
                        tracing::warn!(%xuid, session = %reference, error = %e, "keep-alive failed");
                    }
                }
                None
            }
            PresenceAction::RemoveMember {
                reference,
                index,
                xuid,
            } => {
                let auth = self.host.authorization_header()?;
                match self.directory.remove_member(&auth, &reference, index).await {
                    Ok(()) => {
                        tracing::info!(session = %reference, index, ?xuid, "evicted stale member");
                        self.emit(PresenceEvent::MemberEvicted { index, xuid });
                    }
                    Err(e) => {
                        tracing::warn!(session = %reference, index, error = %e, "member eviction failed");
                    }
                }
                None
            }
            PresenceAction::InvalidateCredential => {
                tracing::warn!(
                    host = %self.machine.host(),
                    "repeated connection failures, discarding cached credential"
                );
                self.host.reset();
                None
            }
            PresenceAction::RefreshCredential { after } => {
                let host = Arc::clone(&self.host);
                let tx = self.input_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let ok = match host.refresh().await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, "forced credential refresh failed");
                            false
                        }
                    };
                    let _ = tx.send(PresenceInput::CredentialRefreshed { ok });
                });
                None
            }
            PresenceAction::Emit(event) => {
                self.emit(event);
                None
            }
        }
    }

    fn open_channel(&mut self, generation: u64) -> Option<PresenceInput> {
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        let Some(authorization) = self.host.authorization_header() else {
            return Some(PresenceInput::ChannelClosed {
                generation,
                reason: Some("host has no credential".into()),
            });
        };
        tracing::debug!(host = %self.machine.host(), generation, "opening real-time channel");
        self.channel_task = Some(tokio::spawn(run_channel(
            Arc::clone(&self.connector),
            authorization,
            generation,
            self.input_tx.clone(),
        )));
        None
    }

    async fn put_session(
        &mut self,
        generation: u64,
        reference: &SessionReference,
        connection: ConnectionId,
    ) -> PresenceInput {
        let Some(auth) = self.host.authorization_header() else {
            return PresenceInput::SessionPutFailed {
                generation,
                error: "host has no credential".into(),
            };
        };
        let content = self.content.current();
        let document = SessionDocument::builder(MemberRecord::active(
            self.machine.host().clone(),
            connection,
        ))
        .content(&content)
        .build();

        match self.directory.put_session(&auth, reference, &document).await {
            Ok(snapshot) => {
                tracing::debug!(
                    session = %reference,
                    active = snapshot.active_count(),
                    "session updated"
                );
                PresenceInput::SessionPutSucceeded {
                    generation,
                    snapshot,
                    observed_at: Utc::now(),
                }
            }
            Err(e) => {
                tracing::warn!(session = %reference, error = %e, "heartbeat failed");
                PresenceInput::SessionPutFailed {
                    generation,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Membership PUT as the joining account, then its activity handle.
    /// The handle is only set once the membership exists.
    async fn join_member(
        &self,
        xuid: &Xuid,
        reference: &SessionReference,
        connection: ConnectionId,
    ) -> bool {
        let Some(auth) = self
            .members
            .get(xuid)
            .and_then(|account| account.authorization_header())
        else {
            tracing::warn!(%xuid, "member has no credential, join deferred");
            return false;
        };
        let document =
            SessionDocument::builder(MemberRecord::active(xuid.clone(), connection)).build();

        if let Err(e) = self.directory.put_session(&auth, reference, &document).await {
            tracing::warn!(%xuid, session = %reference, error = %e, "member join failed");
            return false;
        }
        match self.directory.set_activity_handle(&auth, reference).await {
            Ok(()) => {
                tracing::info!(%xuid, session = %reference, "member joined");
                true
            }
            Err(e) => {
                tracing::warn!(%xuid, session = %reference, error = %e, "member handle failed");
                false
            }
        }
    }

    fn emit(&self, event: PresenceEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self) -> PresenceStatus {
        PresenceStatus {
            state: self.machine.state(),
            reference: self.machine.reference().cloned(),
            generation: self.machine.generation(),
            restart_attempts: self.machine.restart_attempts(),
            handle_set: self.machine.handle_set(),
            members: self
                .machine
                .members()
                .map(|(xuid, joined)| (xuid.clone(), joined))
                .collect(),
        }
    }
}

/// Dials, subscribes, and reports what the channel says until it ends.
async fn run_channel<R: RealtimeConnector>(
    connector: Arc<R>,
    authorization: String,
    generation: u64,
    tx: mpsc::UnboundedSender<PresenceInput>,
) {
    let closed = |reason: Option<String>| PresenceInput::ChannelClosed { generation, reason };

    let channel = match connector.connect(&authorization).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(generation, error = %e, "real-time connect failed");
            let _ = tx.send(closed(Some(e.to_string())));
            return;
        }
    };
    if let Err(e) = channel.send(&subscribe_frame()).await {
        tracing::warn!(generation, error = %e, "subscribe failed");
        let _ = tx.send(closed(Some(e.to_string())));
        return;
    }
    let _ = tx.send(PresenceInput::ChannelOpened { generation });

    loop {
        match channel.recv().await {
            Ok(Some(text)) => match RtaMessage::parse(&text) {
                Ok(RtaMessage::ConnectionId(connection)) => {
                    tracing::debug!(generation, %connection, "connection id received");
                    let _ = tx.send(PresenceInput::ConnectionIdReceived {
                        generation,
                        connection,
                    });
                }
                Ok(RtaMessage::Other) => {
                    tracing::trace!(generation, "real-time frame ignored");
                }
                Err(e) => {
                    tracing::warn!(generation, error = %e, "malformed real-time frame ignored");
                }
            },
            Ok(None) => {
                tracing::info!(generation, "real-time channel closed");
                let _ = tx.send(closed(None));
                return;
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "real-time channel error");
                let _ = tx.send(closed(Some(e.to_string())));
                return;
            }
        }
    }
}
