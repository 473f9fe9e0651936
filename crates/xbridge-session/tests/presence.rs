//! Integration tests for the presence actor.
//!
//! The directory, the token provider and the real-time connector are all
//! in-memory fakes. Each test scripts what the RTA service says through
//! the server side of a [`FakeChannel`] and checks which directory calls
//! the actor made. Time is paused, so heartbeat and cool-down periods pass
//! instantly once every task is idle.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use xbridge_directory::{DirectoryClient, DirectoryError, TokenError, TokenProvider};
use xbridge_protocol::{
    Achievement, JoinPolicy, MemberSnapshot, MembersInfo, PeopleList, SessionContent,
    SessionDocument, SessionReference, SessionSnapshot, SnapshotMemberConstants,
    SnapshotMemberSystem, Xuid,
};
use xbridge_session::{
    ConnectionState, PresenceConfig, PresenceEvent, PresenceEvents, PresenceManager,
};
use xbridge_transport::{RealtimeChannel, RealtimeConnector, TransportError};

// =========================================================================
// Fakes
// =========================================================================

struct FakeToken {
    xuid: Xuid,
    refreshing: AtomicBool,
    resets: AtomicU32,
    refreshes: AtomicU32,
}

impl FakeToken {
    fn new(xuid: &str) -> Arc<Self> {
        Arc::new(Self {
            xuid: Xuid::new(xuid),
            refreshing: AtomicBool::new(false),
            resets: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        })
    }
}

impl TokenProvider for FakeToken {
    fn authorization_header(&self) -> Option<String> {
        Some(format!("XBL3.0 x=uhs;{}", self.xuid))
    }

    fn xuid(&self) -> Option<Xuid> {
        Some(self.xuid.clone())
    }

    fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    async fn wait_for_token(&self) -> Result<Xuid, TokenError> {
        Ok(self.xuid.clone())
    }

    async fn refresh(&self) -> Result<(), TokenError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Put { auth: String, session: String, full: bool },
    Handle { auth: String, session: String },
    KeepAlive { auth: String },
    RemoveMember { index: u32 },
}

#[derive(Default)]
struct FakeDirectory {
    calls: Mutex<Vec<Call>>,
    snapshot: Mutex<SessionSnapshot>,
}

impl FakeDirectory {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn puts(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Put { full: true, .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DirectoryClient for FakeDirectory {
    async fn put_session(
        &self,
        auth: &str,
        reference: &SessionReference,
        document: &SessionDocument,
    ) -> Result<SessionSnapshot, DirectoryError> {
        self.record(Call::Put {
            auth: auth.to_string(),
            session: reference.name.clone(),
            full: document.properties.is_some(),
        });
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn set_activity_handle(
        &self,
        auth: &str,
        reference: &SessionReference,
    ) -> Result<(), DirectoryError> {
        self.record(Call::Handle {
            auth: auth.to_string(),
            session: reference.name.clone(),
        });
        Ok(())
    }

    async fn session_keep_alive(
        &self,
        auth: &str,
        _reference: &SessionReference,
    ) -> Result<SessionSnapshot, DirectoryError> {
        self.record(Call::KeepAlive { auth: auth.to_string() });
        Ok(SessionSnapshot::default())
    }

    async fn remove_member(
        &self,
        _auth: &str,
        _reference: &SessionReference,
        index: u32,
    ) -> Result<(), DirectoryError> {
        self.record(Call::RemoveMember { index });
        Ok(())
    }

    async fn get_friends(&self, _auth: &str) -> Result<PeopleList, DirectoryError> {
        Ok(PeopleList::default())
    }

    async fn add_friend(&self, _auth: &str, _xuid: &Xuid) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn remove_friend(&self, _auth: &str, _xuid: &Xuid) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn get_followers(&self, _auth: &str) -> Result<PeopleList, DirectoryError> {
        Ok(PeopleList::default())
    }

    async fn get_achievements(
        &self,
        _auth: &str,
        _xuid: &Xuid,
    ) -> Result<Vec<Achievement>, DirectoryError> {
        Ok(Vec::new())
    }
}

/// Server side of one fake channel.
struct ServerEnd {
    /// Frames the client sent.
    sent: Arc<Mutex<Vec<String>>>,
    /// Push `Some(frame)` to deliver a frame, `None` to close.
    inbound: mpsc::UnboundedSender<Option<String>>,
}

impl ServerEnd {
    fn send_connection_id(&self, id: &str) {
        let frame = format!(
            r#"[1,1,0,"https://sessiondirectory.xboxlive.com/connections/",{{"ConnectionId":"{id}"}}]"#
        );
        self.inbound.send(Some(frame)).unwrap();
    }

    fn close(&self) {
        let _ = self.inbound.send(None);
    }
}

struct FakeChannel {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<String>>>,
}

impl RealtimeChannel for FakeChannel {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.lock().await.recv().await.flatten())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct FakeConnector {
    connects: AtomicU32,
    fail: AtomicBool,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl RealtimeConnector for FakeConnector {
    type Channel = FakeChannel;

    async fn connect(&self, _authorization: &str) -> Result<FakeChannel, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("refused".into()));
        }
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.servers.send(ServerEnd {
            sent: Arc::clone(&sent),
            inbound: tx,
        });
        Ok(FakeChannel {
            sent,
            inbound: tokio::sync::Mutex::new(rx),
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn content() -> SessionContent {
    SessionContent {
        host_name: "Host".into(),
        world_name: "World".into(),
        version: "1.21.50".into(),
        protocol: 766,
        member_count: 0,
        max_member_count: 40,
        ip: "127.0.0.1".into(),
        port: 19132,
        connection_type: 6,
        owner_xuid: Xuid::new("host"),
        join_policy: JoinPolicy::FriendsOfFriends,
    }
}

struct Harness {
    host: Arc<FakeToken>,
    directory: Arc<FakeDirectory>,
    connector: Arc<FakeConnector>,
    servers: mpsc::UnboundedReceiver<ServerEnd>,
    handle: xbridge_session::PresenceHandle<FakeToken>,
    events: PresenceEvents,
}

fn spawn(config: PresenceConfig, fail_connects: bool) -> Harness {
    let host = FakeToken::new("host");
    let directory = Arc::new(FakeDirectory::default());
    let (servers_tx, servers) = mpsc::unbounded_channel();
    let connector = Arc::new(FakeConnector {
        connects: AtomicU32::new(0),
        fail: AtomicBool::new(fail_connects),
        servers: servers_tx,
    });
    let (handle, events) = PresenceManager::new(
        config,
        Arc::clone(&host),
        Arc::clone(&directory),
        Arc::clone(&connector),
        content(),
    )
    .spawn()
    .expect("host has a credential");
    Harness {
        host,
        directory,
        connector,
        servers,
        handle,
        events,
    }
}

async fn next_event<F>(events: &mut PresenceEvents, pred: F) -> PresenceEvent
where
    F: Fn(&PresenceEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event = events.recv().await.expect("event stream open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

/// Accepts the next channel and hands out a connection id.
async fn connect(h: &mut Harness, id: &str) -> ServerEnd {
    let server = h.servers.recv().await.expect("a channel was dialed");
    server.send_connection_id(id);
    next_event(&mut h.events, |e| {
        matches!(e, PresenceEvent::StateChanged(ConnectionState::Connected))
    })
    .await;
    server
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_presence_subscribes_puts_session_and_sets_handle() {
    let mut h = spawn(PresenceConfig::default(), false);
    let server = connect(&mut h, "conn-1").await;

    next_event(&mut h.events, |e| matches!(e, PresenceEvent::Joined { .. })).await;

    assert_eq!(
        server.sent.lock().unwrap().as_slice(),
        [r#"[1,1,"https://sessiondirectory.xboxlive.com/connections/"]"#]
    );
    let calls = h.directory.calls();
    assert!(matches!(&calls[0], Call::Put { full: true, auth, .. } if auth.ends_with(";host")));
    assert!(matches!(&calls[1], Call::Handle { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_repeats_put_each_interval() {
    let mut h = spawn(PresenceConfig::default(), false);
    let _server = connect(&mut h, "conn-1").await;
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::Joined { .. })).await;

    for _ in 0..2 {
        next_event(&mut h.events, |e| matches!(e, PresenceEvent::SessionUpdated { .. })).await;
    }

    assert_eq!(h.directory.puts().len(), 3);
    let handles = h
        .directory
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Handle { .. }))
        .count();
    assert_eq!(handles, 1, "handle is set once per start");
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_paused_while_token_refreshing() {
    let mut h = spawn(PresenceConfig::default(), false);
    let _server = connect(&mut h, "conn-1").await;
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::Joined { .. })).await;

    h.host.refreshing.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.directory.puts().len(), 1);

    h.host.refreshing.store(false, Ordering::SeqCst);
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::SessionUpdated { .. })).await;
    assert_eq!(h.directory.puts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_connected_opens_no_new_channel() {
    let mut h = spawn(PresenceConfig::default(), false);
    let _server = connect(&mut h, "conn-1").await;
    let before = h.handle.status().await.unwrap();

    h.handle.start().await.unwrap();
    let after = h.handle.status().await.unwrap();

    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(before.reference, after.reference);
    assert_eq!(after.state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_restarts_with_new_session() {
    let mut h = spawn(PresenceConfig::default(), false);
    let server = connect(&mut h, "conn-1").await;
    let first = h.handle.status().await.unwrap().reference.unwrap();

    server.close();
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::ChannelLost { .. })).await;
    let _server = connect(&mut h, "conn-2").await;

    let second = h.handle.status().await.unwrap().reference.unwrap();
    assert_ne!(first.name, second.name);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connect_failures_invalidate_credential_and_keep_trying() {
    let mut h = spawn(PresenceConfig::default(), true);

    next_event(&mut h.events, |e| matches!(e, PresenceEvent::CredentialInvalidated)).await;
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 5);
    assert_eq!(h.host.resets.load(Ordering::SeqCst), 1);
    assert_eq!(h.directory.puts().len(), 0);

    // Service recovers during the cool-down.
    h.connector.fail.store(false, Ordering::SeqCst);
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::CredentialRefreshed { ok: true }))
        .await;
    assert_eq!(h.host.refreshes.load(Ordering::SeqCst), 1);

    let _server = connect(&mut h, "conn-1").await;
    let status = h.handle.status().await.unwrap();
    assert_eq!(status.restart_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_member_after_first_session_update() {
    let mut h = spawn(PresenceConfig::default(), false);
    let alt = FakeToken::new("alt");
    h.handle.join(Arc::clone(&alt)).await.unwrap();

    let _server = connect(&mut h, "conn-1").await;
    next_event(&mut h.events, |e| {
        matches!(e, PresenceEvent::MemberJoined { xuid } if xuid.as_str() == "alt")
    })
    .await;

    let calls = h.directory.calls();
    let alt_put = calls
        .iter()
        .position(|c| matches!(c, Call::Put { full: false, auth, .. } if auth.ends_with(";alt")))
        .expect("membership put");
    let alt_handle = calls
        .iter()
        .position(|c| matches!(c, Call::Handle { auth, .. } if auth.ends_with(";alt")))
        .expect("member handle");
    let host_put = calls
        .iter()
        .position(|c| matches!(c, Call::Put { full: true, .. }))
        .unwrap();
    assert!(host_put < alt_put);
    assert!(alt_put < alt_handle);

    // Next heartbeat keeps the member alive.
    next_event(&mut h.events, |e| matches!(e, PresenceEvent::SessionUpdated { .. })).await;
    assert!(h
        .directory
        .calls()
        .iter()
        .any(|c| matches!(c, Call::KeepAlive { auth } if auth.ends_with(";alt"))));
}

#[tokio::test(start_paused = true)]
async fn test_large_session_evicts_stale_member_by_index() {
    let mut h = spawn(PresenceConfig::default(), false);
    let stale = Utc::now() - chrono::Duration::minutes(6);
    let fresh = Utc::now() + chrono::Duration::minutes(1);
    let member = |xuid: &str, join_time| MemberSnapshot {
        constants: SnapshotMemberConstants {
            system: SnapshotMemberSystem {
                xuid: Some(Xuid::new(xuid)),
            },
        },
        join_time: Some(join_time),
    };
    *h.directory.snapshot.lock().unwrap() = SessionSnapshot {
        members_info: Some(MembersInfo {
            count: 36,
            active: Some(36),
            ..Default::default()
        }),
        members: [
            ("0".to_string(), member("host", stale)),
            ("7".to_string(), member("ghost", stale)),
            ("8".to_string(), member("newcomer", fresh)),
        ]
        .into_iter()
        .collect(),
    };

    let _server = connect(&mut h, "conn-1").await;
    let evicted = next_event(&mut h.events, |e| matches!(e, PresenceEvent::MemberEvicted { .. })).await;

    assert_eq!(
        evicted,
        PresenceEvent::MemberEvicted {
            index: 7,
            xuid: Some(Xuid::new("ghost"))
        }
    );
    let removals: Vec<_> = h
        .directory
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::RemoveMember { .. }))
        .collect();
    assert_eq!(removals, vec![Call::RemoveMember { index: 7 }]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_actor() {
    let mut h = spawn(PresenceConfig::default(), false);
    let _server = connect(&mut h, "conn-1").await;

    h.handle.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.handle.status().await.is_err());
}
