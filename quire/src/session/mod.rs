//! Per-request session state carried between requests by a cookie.
//!
//! A session is a flat string map with a reserved [`EXPIRES_KEY`]. On the
//! way in, [`load_session`] validates the token the client presented; on the
//! way out, the session hook stamps a fresh expiry and saves it again.
//!
//! ```text
//! Absent ──────────────┐
//! PresentMalformed ────┼──▶ Fresh (empty)
//! PresentExpired ──────┘
//! PresentValid ──────────▶ used as-is
//!                              │
//!                              ▼
//!                  saved with new expiry (always)
//! ```

mod config;
mod store;

pub use config::{SessionConfig, SessionStorage};
pub use store::{CookieStore, MemoryStore, SessionStore};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved key holding the Unix expiry timestamp.
pub const EXPIRES_KEY: &str = "expires";

/// Why an inbound session was not usable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionIssue {
    /// The client presented no session, or the store no longer knows it
    #[error("new session")]
    Absent,

    /// The stored session is structurally broken
    #[error("malformed session: {0}")]
    Malformed(String),

    /// The session was well-formed but its expiry has passed
    #[error("session has been expired at {expires}")]
    Expired {
        /// Expiry found in the session
        expires: i64,
    },
}

impl SessionIssue {
    /// `true` for steady-state conditions (absent, expired), `false` for
    /// faults that point to a store or client bug.
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// String key/value session data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(BTreeMap<String, String>);

impl Session {
    /// Empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Store `value` under `key`, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove `key`
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries, including the reserved expiry
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the session holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parsed expiry timestamp.
    pub fn expires(&self) -> Result<i64, SessionIssue> {
        let raw = self
            .get(EXPIRES_KEY)
            .ok_or_else(|| SessionIssue::Malformed("expires value not found".to_string()))?;
        raw.parse::<i64>()
            .map_err(|e| SessionIssue::Malformed(format!("invalid expires value {raw:?}: {e}")))
    }

    /// Stamp the reserved expiry key.
    pub fn set_expires(&mut self, expires: i64) {
        self.insert(EXPIRES_KEY, expires.to_string());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Session {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolve the inbound session for a request.
///
/// `token` is the value of the session cookie, if any; `now` is the current
/// Unix time. Every failure is reported as a [`SessionIssue`] for the caller
/// to log and replace with a fresh session.
pub async fn load_session(
    store: &dyn SessionStore,
    token: Option<&str>,
    now: i64,
) -> Result<Session, SessionIssue> {
    let token = token.filter(|t| !t.is_empty()).ok_or(SessionIssue::Absent)?;
    let session = store.load(token).await?;
    let expires = session.expires()?;
    if expires < now {
        return Err(SessionIssue::Expired { expires });
    }
    Ok(session)
}
