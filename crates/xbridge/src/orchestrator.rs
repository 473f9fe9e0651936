//! Session orchestrator: brings the managed accounts up, gates them,
//! reconciles their friends, elects a host, and keeps the session and the
//! social graph fresh for as long as it runs.
//!
//! Startup is linear:
//!
//! ```text
//! InitializingAccounts → CheckingAchievements → ReconcilingFriends
//!     → ElectingHost → StartingPresence → Running
//! ```
//!
//! Once running, one task owns all orchestrator state and reacts to
//! presence events, social events, and three timers: server ping,
//! reconciliation pass, and the follower sweep.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use xbridge_directory::{DirectoryClient, TokenProvider};
use xbridge_protocol::{SessionContent, Xuid};
use xbridge_session::{PresenceEvent, PresenceEvents, PresenceHandle, PresenceManager};
use xbridge_social::{FriendReconciler, PassReport, SocialEvent, SocialEvents};
use xbridge_tick::{TickConfig, TickScheduler};
use xbridge_transport::{RealtimeConnector, ServerInfoProvider};

use crate::content::{apply_server_info, initial_content};
use crate::{BridgeConfig, BridgeError};

// ---------------------------------------------------------------------------
// StartupStage
// ---------------------------------------------------------------------------

/// Where the orchestrator is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    InitializingAccounts,
    CheckingAchievements,
    ReconcilingFriends,
    ElectingHost,
    StartingPresence,
    Running,
}

impl StartupStage {
    /// The stage that follows this one. `None` once running.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::InitializingAccounts => Some(Self::CheckingAchievements),
            Self::CheckingAchievements => Some(Self::ReconcilingFriends),
            Self::ReconcilingFriends => Some(Self::ElectingHost),
            Self::ElectingHost => Some(Self::StartingPresence),
            Self::StartingPresence => Some(Self::Running),
            Self::Running => None,
        }
    }
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializingAccounts => write!(f, "InitializingAccounts"),
            Self::CheckingAchievements => write!(f, "CheckingAchievements"),
            Self::ReconcilingFriends => write!(f, "ReconcilingFriends"),
            Self::ElectingHost => write!(f, "ElectingHost"),
            Self::StartingPresence => write!(f, "StartingPresence"),
            Self::Running => write!(f, "Running"),
        }
    }
}

// ---------------------------------------------------------------------------
// Events and handle
// ---------------------------------------------------------------------------

/// Everything the orchestrator reports.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    StageChanged(StartupStage),
    /// An account has its first token. `order` is its position in
    /// initialization order; 0 becomes the host.
    AccountReady { xuid: Xuid, order: usize },
    HostElected { xuid: Xuid },
    /// Non-host accounts were handed to the presence manager.
    MembersJoining { count: usize },
    ContentRefreshed(SessionContent),
    ReconcileFinished(PassReport),
    Social(SocialEvent),
    Presence(PresenceEvent),
}

/// Receiving end of the orchestrator's events.
pub type OrchestratorEvents = mpsc::UnboundedReceiver<OrchestratorEvent>;

enum OrchestratorCommand {
    Shutdown,
}

/// Handle to stop a running orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorCommand>,
}

impl OrchestratorHandle {
    /// Asks the orchestrator to stop. [`Orchestrator::run`] then returns
    /// `Ok(())` once running, or [`BridgeError::Stopped`] during startup.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.sender
            .send(OrchestratorCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates accounts, friends and presence for one advertised server.
pub struct Orchestrator<D, R, P, T> {
    config: BridgeConfig,
    directory: Arc<D>,
    connector: Arc<R>,
    pinger: Arc<P>,
    accounts: Vec<Arc<T>>,
    commands: mpsc::Receiver<OrchestratorCommand>,
    events: mpsc::UnboundedSender<OrchestratorEvent>,
    stage: StartupStage,
}

/// State owned by the running loop.
struct Running<D, T> {
    host: Xuid,
    /// Accounts in initialization order; the host first.
    accounts: Vec<Arc<T>>,
    presence: PresenceHandle<T>,
    presence_events: PresenceEvents,
    reconciler: Arc<FriendReconciler<D>>,
    social_events: SocialEvents,
    content: watch::Sender<SessionContent>,
    members_joined: bool,
    reconciling: bool,
    sweeping: HashSet<Xuid>,
}

impl<D, R, P, T> Orchestrator<D, R, P, T>
where
    D: DirectoryClient,
    R: RealtimeConnector,
    P: ServerInfoProvider,
    T: TokenProvider,
{
    pub fn new(
        config: BridgeConfig,
        directory: Arc<D>,
        connector: Arc<R>,
        pinger: Arc<P>,
        accounts: Vec<Arc<T>>,
    ) -> (Self, OrchestratorHandle, OrchestratorEvents) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            config,
            directory,
            connector,
            pinger,
            accounts,
            commands: cmd_rx,
            events: event_tx,
            stage: StartupStage::InitializingAccounts,
        };
        (orchestrator, OrchestratorHandle { sender: cmd_tx }, event_rx)
    }

    /// Runs startup, then the recurring loop until shut down.
    ///
    /// Returns an error only for problems no retry can fix: an account
    /// that never gets a token, an account with unlocked achievements, or
    /// a host whose presence manager cannot start.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        if self.accounts.is_empty() {
            return Err(BridgeError::NoAccounts);
        }
        self.emit(OrchestratorEvent::StageChanged(self.stage));

        let ordered = self.initialize_accounts().await?;
        self.advance();

        if self.config.achievement_gate {
            self.check_achievements(&ordered).await?;
        } else {
            tracing::warn!("achievement gate disabled");
        }
        self.advance();

        let (reconciler, mut social_events) =
            FriendReconciler::new(self.config.social.clone(), Arc::clone(&self.directory));
        let reconciler = Arc::new(reconciler);
        let accounts: Vec<Arc<T>> = ordered.iter().map(|(_, a)| Arc::clone(a)).collect();
        let added = reconciler.befriend_all(&accounts).await;
        tracing::info!(added, accounts = accounts.len(), "managed accounts friended");
        let report = reconciler.run_pass(&accounts).await;
        while let Ok(event) = social_events.try_recv() {
            self.emit(OrchestratorEvent::Social(event));
        }
        self.emit(OrchestratorEvent::ReconcileFinished(report));
        self.advance();

        let (host_xuid, host) = ordered[0].clone();
        tracing::info!(host = %host_xuid, "host elected");
        self.emit(OrchestratorEvent::HostElected {
            xuid: host_xuid.clone(),
        });
        self.advance();

        let mut content = initial_content(&self.config.server, host_xuid.clone());
        self.refresh_content(&mut content).await;
        let (content_tx, content_rx) = watch::channel(content);
        let (presence, presence_events) = PresenceManager::new(
            self.config.presence.clone(),
            host,
            Arc::clone(&self.directory),
            Arc::clone(&self.connector),
            content_rx,
        )
        .spawn()?;
        self.advance();

        let running = Running {
            host: host_xuid,
            accounts,
            presence,
            presence_events,
            reconciler,
            social_events,
            content: content_tx,
            members_joined: false,
            reconciling: false,
            sweeping: HashSet::new(),
        };
        self.run_loop(running).await
    }

    async fn run_loop(&mut self, mut state: Running<D, T>) -> Result<(), BridgeError> {
        let mut ping_tick = TickScheduler::every(self.config.ping_interval());
        let mut reconcile_tick = TickScheduler::every(self.config.reconcile_interval());
        let mut friend_tick = if self.config.auto_friending {
            TickScheduler::every(self.config.auto_friend_interval())
        } else {
            TickScheduler::new(TickConfig::disabled())
        };
        let (pass_tx, mut pass_rx) = mpsc::unbounded_channel::<Result<PassReport, JoinError>>();
        let (sweep_tx, mut sweep_rx) = mpsc::unbounded_channel::<Xuid>();

        loop {
            tokio::select! {
                Some(cmd) = self.commands.recv() => match cmd {
                    OrchestratorCommand::Shutdown => {
                        tracing::info!("orchestrator shutting down");
                        let _ = state.presence.shutdown().await;
                        return Ok(());
                    }
                },
                Some(event) = state.presence_events.recv() => {
                    let first_update = !state.members_joined
                        && matches!(event, PresenceEvent::SessionUpdated { .. });
                    self.emit(OrchestratorEvent::Presence(event));
                    if first_update {
                        state.members_joined = true;
                        self.join_members(&state).await;
                    }
                }
                Some(event) = state.social_events.recv() => {
                    self.emit(OrchestratorEvent::Social(event));
                }
                _ = ping_tick.wait_for_tick() => {
                    let mut content = state.content.borrow().clone();
                    if self.refresh_content(&mut content).await {
                        state.content.send_replace(content);
                    }
                    ping_tick.record_tick_end();
                }
                _ = reconcile_tick.wait_for_tick() => {
                    if state.reconciling {
                        tracing::debug!("reconciliation still running, tick skipped");
                    } else {
                        state.reconciling = true;
                        let reconciler = Arc::clone(&state.reconciler);
                        let accounts = state.accounts.clone();
                        let done = pass_tx.clone();
                        let pass =
                            tokio::spawn(async move { reconciler.run_pass(&accounts).await });
                        tokio::spawn(async move {
                            let _ = done.send(pass.await);
                        });
                    }
                    reconcile_tick.record_tick_end();
                }
                Some(result) = pass_rx.recv() => {
                    state.reconciling = false;
                    match result {
                        Ok(report) => self.emit(OrchestratorEvent::ReconcileFinished(report)),
                        Err(e) => tracing::error!(error = %e, "reconciliation pass aborted"),
                    }
                }
                _ = friend_tick.wait_for_tick() => {
                    self.sweep_followers(&mut state, &sweep_tx);
                    friend_tick.record_tick_end();
                }
                Some(xuid) = sweep_rx.recv() => {
                    state.sweeping.remove(&xuid);
                }
            }
        }
    }

    /// Waits for every account's first token. The order tokens arrive in
    /// is the initialization order.
    async fn initialize_accounts(&mut self) -> Result<Vec<(Xuid, Arc<T>)>, BridgeError> {
        let mut pending: FuturesUnordered<_> = self
            .accounts
            .iter()
            .map(|account| {
                let account = Arc::clone(account);
                async move {
                    let result = account.wait_for_token().await;
                    (account, result)
                }
            })
            .collect();

        let mut ordered = Vec::with_capacity(self.accounts.len());
        while !pending.is_empty() {
            let next = tokio::select! {
                Some(next) = pending.next() => next,
                Some(OrchestratorCommand::Shutdown) = self.commands.recv() => {
                    return Err(BridgeError::Stopped);
                }
            };
            let (account, result) = next;
            let xuid = result.map_err(|e| {
                tracing::error!(error = %e, "account never obtained a token");
                e
            })?;
            let order = ordered.len();
            tracing::info!(%xuid, order, "account ready");
            self.emit(OrchestratorEvent::AccountReady {
                xuid: xuid.clone(),
                order,
            });
            ordered.push((xuid, account));
        }
        Ok(ordered)
    }

    /// Fails on the first account, in initialization order, that has any
    /// unlocked achievement. Fetch failures are retried.
    async fn check_achievements(&mut self, ordered: &[(Xuid, Arc<T>)]) -> Result<(), BridgeError> {
        let directory = Arc::clone(&self.directory);
        let retry = self.config.gate_retry();
        let checks = ordered.iter().map(|(xuid, account)| {
            let directory = Arc::clone(&directory);
            async move {
                loop {
                    if let Some(auth) = account.authorization_header() {
                        match directory.get_achievements(&auth, xuid).await {
                            Ok(list) => {
                                return list.iter().filter(|a| a.is_unlocked()).count();
                            }
                            Err(e) => {
                                tracing::warn!(%xuid, error = %e, source = "achievements", "achievement check failed, retrying");
                            }
                        }
                    }
                    tokio::time::sleep(retry).await;
                }
            }
        });

        let counts = tokio::select! {
            counts = join_all(checks) => counts,
            Some(OrchestratorCommand::Shutdown) = self.commands.recv() => {
                return Err(BridgeError::Stopped);
            }
        };

        for ((xuid, _), count) in ordered.iter().zip(counts) {
            if count > 0 {
                tracing::error!(%xuid, count, "account has unlocked achievements");
                return Err(BridgeError::AchievementsUnlocked {
                    xuid: xuid.clone(),
                    count,
                });
            }
            tracing::debug!(%xuid, "achievement check passed");
        }
        Ok(())
    }

    /// Pings the server and merges the result into `content`. On failure
    /// the content is left as it was. Returns whether anything was applied.
    async fn refresh_content(&self, content: &mut SessionContent) -> bool {
        let server = &self.config.server;
        match self.pinger.ping(&server.ip, server.port).await {
            Ok(info) => {
                apply_server_info(content, &info, server);
                tracing::debug!(
                    players = content.member_count,
                    max = content.max_member_count,
                    version = %content.version,
                    "server info refreshed"
                );
                self.emit(OrchestratorEvent::ContentRefreshed(content.clone()));
                true
            }
            Err(e) => {
                tracing::warn!(
                    ip = %server.ip,
                    port = server.port,
                    error = %e,
                    source = "ping",
                    "server ping failed, keeping last known values"
                );
                false
            }
        }
    }

    async fn join_members(&self, state: &Running<D, T>) {
        let members: Vec<_> = state
            .accounts
            .iter()
            .filter(|account| account.xuid().as_ref() != Some(&state.host))
            .collect();
        for account in members.iter().copied() {
            if let Err(e) = state.presence.join(Arc::clone(account)).await {
                tracing::warn!(error = %e, "could not hand member to presence manager");
            }
        }
        self.emit(OrchestratorEvent::MembersJoining {
            count: members.len(),
        });
    }

    /// Starts a follower sweep for every account that is not refreshing,
    /// not full, and not already being swept.
    fn sweep_followers(&self, state: &mut Running<D, T>, done: &mpsc::UnboundedSender<Xuid>) {
        for account in &state.accounts {
            let Some(xuid) = account.xuid() else {
                continue;
            };
            if account.is_refreshing()
                || state.reconciler.is_full(&xuid)
                || state.sweeping.contains(&xuid)
            {
                continue;
            }
            state.sweeping.insert(xuid.clone());
            let reconciler = Arc::clone(&state.reconciler);
            let account = Arc::clone(account);
            let done = done.clone();
            let sweep = tokio::spawn(async move {
                reconciler.auto_friend_sweep(account.as_ref()).await;
            });
            tokio::spawn(async move {
                if let Err(e) = sweep.await {
                    tracing::error!(account = %xuid, error = %e, "follower sweep aborted");
                }
                let _ = done.send(xuid);
            });
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            tracing::info!(from = %self.stage, to = %next, "startup stage");
            self.stage = next;
            self.emit(OrchestratorEvent::StageChanged(next));
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_stage_next_walks_in_order() {
        let mut stage = StartupStage::InitializingAccounts;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                StartupStage::InitializingAccounts,
                StartupStage::CheckingAchievements,
                StartupStage::ReconcilingFriends,
                StartupStage::ElectingHost,
                StartupStage::StartingPresence,
                StartupStage::Running,
            ]
        );
    }

    #[test]
    fn test_startup_stage_display() {
        assert_eq!(StartupStage::ElectingHost.to_string(), "ElectingHost");
    }
}
