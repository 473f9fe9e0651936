//! Async driver for friend reconciliation.
//!
//! [`FriendReconciler`] fetches what [`plan_pass`] needs, applies the
//! plan, and remembers which accounts are at capacity between passes. All
//! methods take `&self`, so one reconciler can be shared behind an `Arc`
//! by a pass task and the per-account sweeps at the same time.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use xbridge_directory::{DirectoryClient, TokenProvider};
use xbridge_protocol::Xuid;

use crate::{plan_pass, AccountListing, RemovalReason, SocialConfig, SocialEvent};

/// Receiving end of a reconciler's events.
pub type SocialEvents = mpsc::UnboundedReceiver<SocialEvent>;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Accounts whose friend list was fetched.
    pub listed: usize,
    /// Accounts skipped because the fetch failed or no token was at hand.
    pub unreachable: Vec<Xuid>,
    /// Accounts at capacity.
    pub full: BTreeSet<Xuid>,
    pub removed: usize,
    pub failed_removals: usize,
}

/// Summary of one follower sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub followers: usize,
    pub added: usize,
    pub removed: usize,
}

/// Keeps managed accounts friended with each other and free of one-sided
/// or duplicated outside friends.
pub struct FriendReconciler<D> {
    config: SocialConfig,
    directory: Arc<D>,
    full: Mutex<BTreeSet<Xuid>>,
    events: mpsc::UnboundedSender<SocialEvent>,
}

impl<D: DirectoryClient> FriendReconciler<D> {
    pub fn new(config: SocialConfig, directory: Arc<D>) -> (Self, SocialEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let reconciler = Self {
            config,
            directory,
            full: Mutex::new(BTreeSet::new()),
            events,
        };
        (reconciler, rx)
    }

    /// `true` when `account` was at capacity in the last pass.
    pub fn is_full(&self, account: &Xuid) -> bool {
        self.full
            .lock()
            .map(|full| full.contains(account))
            .unwrap_or(false)
    }

    /// Adds every managed account as a friend of every other one.
    ///
    /// Adding an existing friend is a no-op on the service side, so this
    /// is safe to repeat. Returns the number of successful adds.
    pub async fn befriend_all<T: TokenProvider>(&self, accounts: &[Arc<T>]) -> usize {
        let pairs: Vec<_> = accounts
            .iter()
            .filter_map(|account| Some((account, account.xuid()?)))
            .collect();

        let mut added = 0;
        for (account, xuid) in &pairs {
            let Some(auth) = account.authorization_header() else {
                tracing::warn!(%xuid, "no token, skipping mutual friending");
                continue;
            };
            for (_, friend) in pairs.iter().filter(|(_, other)| other != xuid) {
                match self.directory.add_friend(&auth, friend).await {
                    Ok(()) => {
                        added += 1;
                        tracing::debug!(account = %xuid, %friend, "managed account friended");
                        self.emit(SocialEvent::FriendAdded {
                            account: xuid.clone(),
                            friend: friend.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            account = %xuid,
                            %friend,
                            error = %e,
                            source = "mutual-friend",
                            "add friend failed"
                        );
                    }
                }
            }
        }
        added
    }

    /// Runs one reconciliation pass over `accounts`, which must be in
    /// initialization order.
    ///
    /// Every friend list is fetched concurrently and nothing is removed
    /// until all fetches are back. An account whose fetch fails sits the
    /// pass out; it still counts as managed.
    pub async fn run_pass<T: TokenProvider>(&self, accounts: &[Arc<T>]) -> PassReport {
        let mut report = PassReport::default();
        let managed: BTreeSet<Xuid> = accounts.iter().filter_map(|a| a.xuid()).collect();

        let fetches = accounts.iter().map(|account| async move {
            let xuid = account.xuid()?;
            let Some(auth) = account.authorization_header() else {
                return Some((xuid, None));
            };
            match self.directory.get_friends(&auth).await {
                Ok(friends) => Some((xuid, Some((auth, friends)))),
                Err(e) => {
                    tracing::warn!(%xuid, error = %e, source = "reconcile", "friend list fetch failed");
                    Some((xuid, None))
                }
            }
        });

        let mut listings = Vec::new();
        let mut auths = Vec::new();
        for (xuid, fetched) in join_all(fetches).await.into_iter().flatten() {
            match fetched {
                Some((auth, friends)) => {
                    auths.push((xuid.clone(), auth));
                    listings.push(AccountListing {
                        account: xuid,
                        friends,
                    });
                }
                None => report.unreachable.push(xuid),
            }
        }
        report.listed = listings.len();

        let plan = plan_pass(&listings, &managed, self.config.friend_capacity);
        self.update_full(&listings, &plan.full);
        report.full = plan.full.clone();

        for removal in plan.removals {
            let Some((_, auth)) = auths.iter().find(|(xuid, _)| *xuid == removal.account) else {
                continue;
            };
            match self.directory.remove_friend(auth, &removal.friend).await {
                Ok(()) => {
                    report.removed += 1;
                    tracing::info!(
                        account = %removal.account,
                        friend = %removal.friend,
                        reason = %removal.reason,
                        "friend removed"
                    );
                    self.emit(SocialEvent::FriendRemoved {
                        account: removal.account,
                        friend: removal.friend,
                        reason: removal.reason,
                    });
                }
                Err(e) => {
                    report.failed_removals += 1;
                    tracing::warn!(
                        account = %removal.account,
                        friend = %removal.friend,
                        error = %e,
                        source = "reconcile",
                        "remove friend failed"
                    );
                }
            }
        }

        tracing::info!(
            listed = report.listed,
            removed = report.removed,
            full = report.full.len(),
            "reconciliation pass finished"
        );
        report
    }

    /// Follows back every follower of `account` that is not followed yet
    /// and drops listed people who stopped following.
    ///
    /// Returns `None` without calling the service when the account's
    /// token is refreshing or the account is full.
    pub async fn auto_friend_sweep<T: TokenProvider>(&self, account: &T) -> Option<SweepReport> {
        let xuid = account.xuid()?;
        if account.is_refreshing() || self.is_full(&xuid) {
            tracing::debug!(%xuid, "auto-friend sweep skipped");
            return None;
        }
        let auth = account.authorization_header()?;
        let followers = match self.directory.get_followers(&auth).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(%xuid, error = %e, source = "auto-friend", "followers fetch failed");
                return None;
            }
        };

        let mut report = SweepReport {
            followers: followers.people.len(),
            ..SweepReport::default()
        };
        for person in followers.people {
            if person.is_following_caller {
                if person.is_followed_by_caller {
                    continue;
                }
                match self.directory.add_friend(&auth, &person.xuid).await {
                    Ok(()) => {
                        report.added += 1;
                        self.emit(SocialEvent::FriendAdded {
                            account: xuid.clone(),
                            friend: person.xuid,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(%xuid, friend = %person.xuid, error = %e, source = "auto-friend", "add friend failed");
                    }
                }
            } else {
                match self.directory.remove_friend(&auth, &person.xuid).await {
                    Ok(()) => {
                        report.removed += 1;
                        self.emit(SocialEvent::FriendRemoved {
                            account: xuid.clone(),
                            friend: person.xuid,
                            reason: RemovalReason::Unfollowed,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(%xuid, friend = %person.xuid, error = %e, source = "auto-friend", "remove friend failed");
                    }
                }
            }
        }
        tracing::debug!(%xuid, followers = report.followers, added = report.added, removed = report.removed, "auto-friend sweep");
        Some(report)
    }

    /// Marks accounts that reached capacity and unmarks listed accounts
    /// that dropped below it. Accounts missing from this pass keep their
    /// previous mark.
    fn update_full(&self, listings: &[AccountListing], now_full: &BTreeSet<Xuid>) {
        let Ok(mut full) = self.full.lock() else {
            return;
        };
        for listing in listings {
            let account = &listing.account;
            if now_full.contains(account) {
                if full.insert(account.clone()) {
                    tracing::warn!(%account, friends = listing.friends.len(), "friend list full");
                    self.emit(SocialEvent::AccountFull {
                        account: account.clone(),
                    });
                }
            } else if full.remove(account) {
                tracing::info!(%account, "friend list below capacity again");
                self.emit(SocialEvent::AccountAvailable {
                    account: account.clone(),
                });
            }
        }
    }

    fn emit(&self, event: SocialEvent) {
        let _ = self.events.send(event);
    }
}
