//! The token provider contract.
//!
//! Acquiring and refreshing Xbox Live tokens (MSA device flow, XSTS
//! exchange, on-disk cache) is someone else's job. The bridge only needs a
//! handful of things from whoever does it, captured by [`TokenProvider`]:
//!
//! - the current `Authorization` header, if a token is cached;
//! - which xuid the token belongs to;
//! - whether a refresh is in flight (heartbeats pause meanwhile);
//! - a way to force a refresh, and to throw away the cached secondary
//!   (XSTS) credential when the presence manager decides it is poisoned.

use std::future::Future;
use std::sync::Mutex;

use xbridge_protocol::Xuid;

use crate::TokenError;

/// Builds the Xbox Live `Authorization` header value.
///
/// ```
/// assert_eq!(
///     xbridge_directory::xbl_authorization("uhs", "tok"),
///     "XBL3.0 x=uhs;tok"
/// );
/// ```
pub fn xbl_authorization(user_hash: &str, xsts_token: &str) -> String {
    format!("XBL3.0 x={user_hash};{xsts_token}")
}

/// Source of credentials for one managed account.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because the same provider is read by the
/// orchestrator, the presence actor and the reconciler, each on its own
/// task.
pub trait TokenProvider: Send + Sync + 'static {
    /// Current `Authorization` header value, or `None` before the first
    /// token arrives.
    fn authorization_header(&self) -> Option<String>;

    /// The account this provider authenticates, once known.
    fn xuid(&self) -> Option<Xuid>;

    /// `true` while a refresh is in flight.
    fn is_refreshing(&self) -> bool;

    /// Resolves once the first token is available.
    fn wait_for_token(
        &self,
    ) -> impl Future<Output = Result<Xuid, TokenError>> + Send;

    /// Forces a refresh and resolves when it finishes.
    fn refresh(&self) -> impl Future<Output = Result<(), TokenError>> + Send;

    /// Discards the cached secondary credential so the next refresh starts
    /// from the primary one.
    fn reset(&self);
}

/// A provider with a fixed, already-acquired credential.
///
/// Useful when tokens come from an external tool and for tests. `refresh`
/// and `reset` are no-ops apart from being counted.
#[derive(Debug)]
pub struct StaticTokenProvider {
    xuid: Xuid,
    header: String,
    counters: Mutex<(u32, u32)>,
}

impl StaticTokenProvider {
    /// Creates a provider for `xuid` from a user hash and an XSTS token.
    pub fn new(xuid: Xuid, user_hash: &str, xsts_token: &str) -> Self {
        Self {
            xuid,
            header: xbl_authorization(user_hash, xsts_token),
            counters: Mutex::new((0, 0)),
        }
    }

    /// How many times `refresh` was called.
    pub fn refresh_count(&self) -> u32 {
        self.counters.lock().map(|c| c.0).unwrap_or_default()
    }

    /// How many times `reset` was called.
    pub fn reset_count(&self) -> u32 {
        self.counters.lock().map(|c| c.1).unwrap_or_default()
    }
}

impl TokenProvider for StaticTokenProvider {
    fn authorization_header(&self) -> Option<String> {
        Some(self.header.clone())
    }

    fn xuid(&self) -> Option<Xuid> {
        Some(self.xuid.clone())
    }

    fn is_refreshing(&self) -> bool {
        false
    }

    async fn wait_for_token(&self) -> Result<Xuid, TokenError> {
        Ok(self.xuid.clone())
    }

    async fn refresh(&self) -> Result<(), TokenError> {
        if let Ok(mut counters) = self.counters.lock() {
            counters.0 += 1;
        }
        Ok(())
    }

    fn reset(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.1 += 1;
        }
    }
}
