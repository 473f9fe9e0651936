//! Error types for the directory layer.

/// Errors returned by a [`DirectoryClient`](crate::DirectoryClient).
///
/// Every variant names the endpoint it came from so a log line is enough
/// to tell which periodic action was skipped.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The request never got a response (DNS, TLS, reset, ...).
    #[error("{endpoint} request failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The body could not be decoded into the expected payload.
    #[error("{endpoint} returned an undecodable body: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DirectoryError {
    /// The endpoint label the error came from.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Http { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }

    /// HTTP status, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors surfaced by a [`TokenProvider`](crate::TokenProvider).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No token could be obtained at all.
    #[error("token unavailable: {0}")]
    Unavailable(String),

    /// A forced refresh failed. The previous token, if any, stays cached.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}
