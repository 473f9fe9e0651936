//! Integration tests for [`FriendReconciler`] against an in-memory social
//! service.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use xbridge_directory::{DirectoryClient, DirectoryError, TokenError, TokenProvider};
use xbridge_protocol::{
    Achievement, PeopleList, Person, SessionDocument, SessionReference, SessionSnapshot, Xuid,
};
use xbridge_social::{
    FriendReconciler, RemovalReason, SocialConfig, SocialEvent, SocialEvents,
};

// =========================================================================
// Fakes
// =========================================================================

struct Account {
    xuid: Xuid,
    refreshing: AtomicBool,
}

impl Account {
    fn new(xuid: &str) -> Arc<Self> {
        Arc::new(Self {
            xuid: Xuid::new(xuid),
            refreshing: AtomicBool::new(false),
        })
    }
}

impl TokenProvider for Account {
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
        Ok(())
    }

    fn reset(&self) {}
}

/// A social graph keyed by account: who each account follows, and who
/// follows it.
#[derive(Default)]
struct Social {
    following: Mutex<BTreeMap<Xuid, Vec<Xuid>>>,
    followers: Mutex<BTreeMap<Xuid, Vec<Xuid>>>,
    /// Reported list size override, for capacity tests.
    total: Mutex<BTreeMap<Xuid, u32>>,
    unreachable: Mutex<HashSet<Xuid>>,
    adds: Mutex<Vec<(Xuid, Xuid)>>,
    removes: Mutex<Vec<(Xuid, Xuid)>>,
}

fn caller(auth: &str) -> Xuid {
    Xuid::new(auth.rsplit(';').next().unwrap_or_default())
}

impl Social {
    fn follow(&self, who: &str, whom: &str) {
        self.following
            .lock()
            .unwrap()
            .entry(Xuid::new(who))
            .or_default()
            .push(Xuid::new(whom));
        self.followers
            .lock()
            .unwrap()
            .entry(Xuid::new(whom))
            .or_default()
            .push(Xuid::new(who));
    }

    fn mutual(&self, a: &str, b: &str) {
        self.follow(a, b);
        self.follow(b, a);
    }

    fn follows(&self, who: &Xuid, whom: &Xuid) -> bool {
        self.following
            .lock()
            .unwrap()
            .get(who)
            .is_some_and(|list| list.contains(whom))
    }

    fn person(&self, me: &Xuid, other: &Xuid) -> Person {
        Person {
            xuid: other.clone(),
            is_following_caller: self.follows(other, me),
            is_followed_by_caller: self.follows(me, other),
            gamertag: None,
        }
    }

    fn removes(&self) -> Vec<(String, String)> {
        self.removes
            .lock()
            .unwrap()
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn adds(&self) -> Vec<(String, String)> {
        self.adds
            .lock()
            .unwrap()
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }
}

fn unused() -> DirectoryError {
    DirectoryError::Status {
        endpoint: "unused",
        status: 500,
        body: String::new(),
    }
}

impl DirectoryClient for Social {
    async fn put_session(
        &self,
        _auth: &str,
        _reference: &SessionReference,
        _document: &SessionDocument,
    ) -> Result<SessionSnapshot, DirectoryError> {
        Err(unused())
    }

    async fn set_activity_handle(
        &self,
        _auth: &str,
        _reference: &SessionReference,
    ) -> Result<(), DirectoryError> {
        Err(unused())
    }

    async fn session_keep_alive(
        &self,
        _auth: &str,
        _reference: &SessionReference,
    ) -> Result<SessionSnapshot, DirectoryError> {
        Err(unused())
    }

    async fn remove_member(
        &self,
        _auth: &str,
        _reference: &SessionReference,
        _index: u32,
    ) -> Result<(), DirectoryError> {
        Err(unused())
    }

    async fn get_friends(&self, auth: &str) -> Result<PeopleList, DirectoryError> {
        let me = caller(auth);
        if self.unreachable.lock().unwrap().contains(&me) {
            return Err(DirectoryError::Status {
                endpoint: "friends",
                status: 503,
                body: String::new(),
            });
        }
        let following = self
            .following
            .lock()
            .unwrap()
            .get(&me)
            .cloned()
            .unwrap_or_default();
        // The social list carries no isFollowedByCaller; it only lists
        // people the caller follows.
        let people: Vec<Person> = following
            .iter()
            .map(|x| Person {
                is_followed_by_caller: false,
                ..self.person(&me, x)
            })
            .collect();
        let total = self.total.lock().unwrap().get(&me).copied();
        Ok(PeopleList {
            total_count: Some(total.unwrap_or(people.len() as u32)),
            people,
        })
    }

    async fn add_friend(&self, auth: &str, xuid: &Xuid) -> Result<(), DirectoryError> {
        let me = caller(auth);
        self.adds.lock().unwrap().push((me.clone(), xuid.clone()));
        if !self.follows(&me, xuid) {
            self.follow(me.as_str(), xuid.as_str());
        }
        Ok(())
    }

    async fn remove_friend(&self, auth: &str, xuid: &Xuid) -> Result<(), DirectoryError> {
        let me = caller(auth);
        self.removes.lock().unwrap().push((me.clone(), xuid.clone()));
        if let Some(list) = self.following.lock().unwrap().get_mut(&me) {
            list.retain(|x| x != xuid);
        }
        if let Some(list) = self.followers.lock().unwrap().get_mut(xuid) {
            list.retain(|x| *x != me);
        }
        Ok(())
    }

    async fn get_followers(&self, auth: &str) -> Result<PeopleList, DirectoryError> {
        let me = caller(auth);
        // People-hub lists followers plus people the caller follows.
        let mut xuids = self
            .followers
            .lock()
            .unwrap()
            .get(&me)
            .cloned()
            .unwrap_or_default();
        for x in self.following.lock().unwrap().get(&me).cloned().unwrap_or_default() {
            if !xuids.contains(&x) {
                xuids.push(x);
            }
        }
        Ok(PeopleList {
            people: xuids.iter().map(|x| self.person(&me, x)).collect(),
            total_count: None,
        })
    }

    async fn get_achievements(
        &self,
        _auth: &str,
        _xuid: &Xuid,
    ) -> Result<Vec<Achievement>, DirectoryError> {
        Err(unused())
    }
}

fn reconciler(social: &Arc<Social>) -> (FriendReconciler<Social>, SocialEvents) {
    FriendReconciler::new(SocialConfig::default(), Arc::clone(social))
}

fn drain(events: &mut SocialEvents) -> Vec<SocialEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// =========================================================================
// befriend_all
// =========================================================================

#[tokio::test]
async fn test_befriend_all_adds_every_ordered_pair() {
    let social = Arc::new(Social::default());
    let (reconciler, mut events) = reconciler(&social);
    let accounts = vec![Account::new("host"), Account::new("alt1"), Account::new("alt2")];

    let added = reconciler.befriend_all(&accounts).await;

    assert_eq!(added, 6);
    let adds = social.adds();
    for (a, b) in [
        ("host", "alt1"),
        ("host", "alt2"),
        ("alt1", "host"),
        ("alt1", "alt2"),
        ("alt2", "host"),
        ("alt2", "alt1"),
    ] {
        assert!(adds.contains(&(a.to_string(), b.to_string())), "missing {a} -> {b}");
    }
    let added_events = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SocialEvent::FriendAdded { .. }))
        .count();
    assert_eq!(added_events, 6);
}

#[tokio::test]
async fn test_befriend_all_single_account_adds_nothing() {
    let social = Arc::new(Social::default());
    let (reconciler, _events) = reconciler(&social);

    assert_eq!(reconciler.befriend_all(&[Account::new("host")]).await, 0);
    assert!(social.adds().is_empty());
}

// =========================================================================
// run_pass
// =========================================================================

#[tokio::test]
async fn test_run_pass_removes_duplicate_from_later_account() {
    let social = Arc::new(Social::default());
    social.mutual("a", "x");
    social.mutual("b", "x");
    let (reconciler, mut events) = reconciler(&social);
    let accounts = vec![Account::new("a"), Account::new("b")];

    let report = reconciler.run_pass(&accounts).await;

    assert_eq!(report.removed, 1);
    assert_eq!(social.removes(), vec![("b".to_string(), "x".to_string())]);
    assert!(social.follows(&Xuid::new("a"), &Xuid::new("x")));
    assert!(!social.follows(&Xuid::new("b"), &Xuid::new("x")));
    assert_eq!(
        drain(&mut events),
        vec![SocialEvent::FriendRemoved {
            account: Xuid::new("b"),
            friend: Xuid::new("x"),
            reason: RemovalReason::Duplicate {
                owner: Xuid::new("a")
            },
        }]
    );
}

#[tokio::test]
async fn test_run_pass_removes_one_sided_edges() {
    let social = Arc::new(Social::default());
    social.follow("a", "stranger");
    social.mutual("a", "pal");
    let (reconciler, _events) = reconciler(&social);

    reconciler.run_pass(&[Account::new("a")]).await;

    assert_eq!(social.removes(), vec![("a".to_string(), "stranger".to_string())]);
}

#[tokio::test]
async fn test_run_pass_converges_after_one_pass() {
    let social = Arc::new(Social::default());
    social.mutual("a", "b");
    social.mutual("a", "x");
    social.mutual("b", "x");
    social.mutual("c", "x");
    social.follow("c", "y");
    social.mutual("b", "z");
    let (reconciler, _events) = reconciler(&social);
    let accounts = vec![Account::new("a"), Account::new("b"), Account::new("c")];

    let first = reconciler.run_pass(&accounts).await;
    let second = reconciler.run_pass(&accounts).await;

    assert_eq!(first.removed, 3);
    assert_eq!(second.removed, 0);
    assert!(social.follows(&Xuid::new("a"), &Xuid::new("b")), "managed edge kept");
    assert!(social.follows(&Xuid::new("b"), &Xuid::new("z")));
}

#[tokio::test]
async fn test_run_pass_unreachable_account_sits_out() {
    let social = Arc::new(Social::default());
    social.mutual("a", "x");
    social.mutual("b", "x");
    social.unreachable.lock().unwrap().insert(Xuid::new("a"));
    let (reconciler, _events) = reconciler(&social);

    let report = reconciler
        .run_pass(&[Account::new("a"), Account::new("b")])
        .await;

    assert_eq!(report.listed, 1);
    assert_eq!(report.unreachable, vec![Xuid::new("a")]);
    assert!(social.removes().is_empty());
}

#[tokio::test]
async fn test_run_pass_full_account_marked_then_unmarked() {
    let social = Arc::new(Social::default());
    social.follow("a", "stranger");
    social.total.lock().unwrap().insert(Xuid::new("a"), 1000);
    let (reconciler, mut events) = reconciler(&social);
    let accounts = vec![Account::new("a")];

    let report = reconciler.run_pass(&accounts).await;
    assert!(report.full.contains(&Xuid::new("a")));
    assert!(reconciler.is_full(&Xuid::new("a")));
    assert!(social.removes().is_empty());
    assert_eq!(
        drain(&mut events),
        vec![SocialEvent::AccountFull {
            account: Xuid::new("a")
        }]
    );

    social.total.lock().unwrap().remove(&Xuid::new("a"));
    reconciler.run_pass(&accounts).await;
    assert!(!reconciler.is_full(&Xuid::new("a")));
    assert_eq!(
        drain(&mut events)[0],
        SocialEvent::AccountAvailable {
            account: Xuid::new("a")
        }
    );
}

// =========================================================================
// auto_friend_sweep
// =========================================================================

#[tokio::test]
async fn test_auto_friend_sweep_follows_back_and_drops_unfollowers() {
    let social = Arc::new(Social::default());
    social.follow("fan", "host");
    social.follow("host", "gone");
    social.mutual("host", "pal");
    let (reconciler, _events) = reconciler(&social);
    let host = Account::new("host");

    let report = reconciler.auto_friend_sweep(host.as_ref()).await.unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(social.adds(), vec![("host".to_string(), "fan".to_string())]);
    assert_eq!(social.removes(), vec![("host".to_string(), "gone".to_string())]);
}

#[tokio::test]
async fn test_auto_friend_sweep_skipped_while_refreshing() {
    let social = Arc::new(Social::default());
    social.follow("fan", "host");
    let (reconciler, _events) = reconciler(&social);
    let host = Account::new("host");
    host.refreshing.store(true, Ordering::SeqCst);

    assert!(reconciler.auto_friend_sweep(host.as_ref()).await.is_none());
    assert!(social.adds().is_empty());
}

#[tokio::test]
async fn test_auto_friend_sweep_skipped_when_full() {
    let social = Arc::new(Social::default());
    social.follow("fan", "host");
    social.total.lock().unwrap().insert(Xuid::new("host"), 1000);
    let (reconciler, _events) = reconciler(&social);
    let host = Account::new("host");

    reconciler.run_pass(&[Arc::clone(&host)]).await;

    assert!(reconciler.auto_friend_sweep(host.as_ref()).await.is_none());
    assert!(social.adds().is_empty());
}
