//! Pure planning for one reconciliation pass.
//!
//! [`plan_pass`] takes every account's friend list, already fetched, and
//! decides which edges to remove. It performs no I/O, so the convergence
//! rules can be tested on plain data:
//!
//! - an account at capacity is reported as full and left alone;
//! - an edge the other side no longer reciprocates is removed;
//! - an outside xuid that is a mutual friend of several managed accounts
//!   stays with the account listed first and is removed from the rest.
//!
//! Edges between managed accounts are never touched here. Managed accounts
//! are friended with each other separately and must stay that way.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use xbridge_protocol::{PeopleList, Xuid};

use crate::RemovalReason;

/// One account's friend list as fetched at the start of a pass.
#[derive(Debug, Clone)]
pub struct AccountListing {
    pub account: Xuid,
    pub friends: PeopleList,
}

/// Mutual friends per managed account, built fresh for every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendGraph {
    edges: BTreeMap<Xuid, BTreeSet<Xuid>>,
}

impl FriendGraph {
    /// Mutual friends retained by `account`.
    pub fn friends_of(&self, account: &Xuid) -> Option<&BTreeSet<Xuid>> {
        self.edges.get(account)
    }

    /// Managed accounts that retain `friend`.
    pub fn owners_of(&self, friend: &Xuid) -> Vec<&Xuid> {
        self.edges
            .iter()
            .filter(|(_, friends)| friends.contains(friend))
            .map(|(account, _)| account)
            .collect()
    }

    fn insert(&mut self, account: &Xuid, friend: Xuid) {
        self.edges.entry(account.clone()).or_default().insert(friend);
    }

    fn remove(&mut self, account: &Xuid, friend: &Xuid) {
        if let Some(friends) = self.edges.get_mut(account) {
            friends.remove(friend);
        }
    }
}

/// A friend edge to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub account: Xuid,
    pub friend: Xuid,
    pub reason: RemovalReason,
}

/// Outcome of planning one pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Edges to delete, one-sided ones first, in listing order.
    pub removals: Vec<Removal>,
    /// What each non-full account keeps once the removals are applied.
    pub graph: FriendGraph,
    /// Accounts at capacity this pass.
    pub full: BTreeSet<Xuid>,
}

/// Plans one reconciliation pass.
///
/// `listings` must be in initialization order: when an outside xuid is
/// shared, the earliest listing keeps it. `managed` holds every managed
/// account, including any whose listing could not be fetched.
pub fn plan_pass(
    listings: &[AccountListing],
    managed: &BTreeSet<Xuid>,
    capacity: usize,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    // Mutual friends per account in listing order, for the duplicate scan.
    let mut retained: Vec<(&Xuid, Vec<&Xuid>)> = Vec::new();

    for listing in listings {
        if listing.friends.len() >= capacity {
            plan.full.insert(listing.account.clone());
            continue;
        }
        let mut mutual = Vec::new();
        for person in &listing.friends.people {
            if managed.contains(&person.xuid) {
                continue;
            }
            // Every listed person is followed by the account; the edge is
            // mutual exactly when they follow back.
            if person.is_following_caller {
                plan.graph.insert(&listing.account, person.xuid.clone());
                mutual.push(&person.xuid);
            } else {
                plan.removals.push(Removal {
                    account: listing.account.clone(),
                    friend: person.xuid.clone(),
                    reason: RemovalReason::OneSided,
                });
            }
        }
        retained.push((&listing.account, mutual));
    }

    let mut owners: HashMap<&Xuid, &Xuid> = HashMap::new();
    for (account, friends) in retained {
        for friend in friends {
            match owners.get(friend) {
                Some(owner) if *owner != account => {
                    plan.graph.remove(account, friend);
                    plan.removals.push(Removal {
                        account: account.clone(),
                        friend: friend.clone(),
                        reason: RemovalReason::Duplicate {
                            owner: (*owner).clone(),
                        },
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(friend, account);
                }
            }
        }
    }

    plan
}
