//! Identity types shared by every xbridge crate.
//!
//! These are the small values that get passed around everywhere: who an
//! account is ([`Xuid`]), which session document we are talking about
//! ([`SessionReference`]), and which real-time connection a member is
//! bound to ([`ConnectionId`]).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Xuid
// ---------------------------------------------------------------------------

/// An Xbox user id.
///
/// XUIDs are 64-bit numbers, but every Xbox Live service sends and expects
/// them as decimal strings, so we keep the string form to avoid a lossy
/// round-trip. `#[serde(transparent)]` makes `Xuid("2535...")` serialize
/// as just `"2535..."`.
///
/// `Ord` is derived so xuids can live in `BTreeSet`/`BTreeMap`, which keeps
/// iteration order stable in logs and tests.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Xuid(pub String);

impl Xuid {
    /// Creates an `Xuid` from anything string-like.
    pub fn new(xuid: impl Into<String>) -> Self {
        Self(xuid.into())
    }

    /// Returns the raw decimal string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `xuid(...)` form used in social and achievements URLs.
    pub fn url_segment(&self) -> String {
        format!("xuid({})", self.0)
    }
}

impl fmt::Display for Xuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Xuid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// The id the real-time service assigns to one live connection.
///
/// A session member can only be marked `active` when its record names the
/// connection id of a live subscription, which is why the presence manager
/// refuses to write the session before it has one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionReference
// ---------------------------------------------------------------------------

/// The `(scid, templateName, name)` triple identifying one session document.
///
/// The field names follow the directory's JSON (`scid`, `templateName`,
/// `name`) because this struct is embedded verbatim in handle requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionReference {
    /// Service configuration id. Part 1 of the session identifier.
    pub scid: String,
    /// Session template name. Part 2 of the session identifier.
    #[serde(rename = "templateName")]
    pub template_name: String,
    /// Session name. Part 3 of the session identifier.
    pub name: String,
}

impl SessionReference {
    /// Creates a reference from its three parts.
    pub fn new(
        scid: impl Into<String>,
        template_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            scid: scid.into(),
            template_name: template_name.into(),
            name: name.into(),
        }
    }

    /// The path of this session below the session-directory root.
    pub fn path(&self) -> String {
        format!(
            "/serviceconfigs/{}/sessionTemplates/{}/sessions/{}",
            self.scid, self.template_name, self.name
        )
    }
}

impl fmt::Display for SessionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scid, self.template_name, self.name)
    }
}
