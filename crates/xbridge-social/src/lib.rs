//! Friend reconciliation for xbridge.
//!
//! Keeps the social graph of every managed account in shape:
//!
//! - every managed account is a friend of every other one
//!   ([`FriendReconciler::befriend_all`]);
//! - no account keeps a friend that stopped following it back;
//! - no outside xuid is a mutual friend of two managed accounts; the
//!   account initialized first keeps it ([`plan_pass`]);
//! - followers get followed back ([`FriendReconciler::auto_friend_sweep`]).

mod config;
mod event;
mod plan;
mod reconciler;

pub use config::{SocialConfig, FRIEND_CAPACITY};
pub use event::{RemovalReason, SocialEvent};
pub use plan::{plan_pass, AccountListing, FriendGraph, ReconcilePlan, Removal};
pub use reconciler::{FriendReconciler, PassReport, SocialEvents, SweepReport};
