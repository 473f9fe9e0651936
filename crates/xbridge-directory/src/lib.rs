//! Xbox Live collaborators for xbridge.
//!
//! Two contracts live here:
//!
//! - [`TokenProvider`]: where an account's credentials come from.
//! - [`DirectoryClient`]: the REST calls against the session directory,
//!   social, people-hub and achievements services, with
//!   [`XboxDirectoryClient`] as the `reqwest` implementation.
//!
//! Both are traits with `Send` futures so the presence actor and the
//! reconciler can hold them behind an `Arc` and call them from spawned
//! tasks, and so tests can swap in in-memory fakes.

mod client;
mod error;
mod token;

pub use client::{DirectoryClient, Endpoints, XboxDirectoryClient};
pub use error::{DirectoryError, TokenError};
pub use token::{xbl_authorization, StaticTokenProvider, TokenProvider};
