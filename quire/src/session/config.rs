//! Session configuration types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::cookie::{Cookie, SameSite};

use super::store::{CookieStore, MemoryStore, SessionStore};
use crate::error::{Error, Result};

/// Session storage backend type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStorage {
    /// In-memory storage (development only, not persistent).
    #[default]
    Memory,
    /// The whole session travels in a signed cookie.
    Cookie,
}

/// Session configuration.
///
/// # Example
///
/// ```toml
/// [session]
/// cookie_name = "session_id"
/// expiry_secs = 86400
/// cookie_expiry_secs = 2592000
/// secure = true
/// same_site = "lax"
/// storage = "cookie"
/// secret = "a long random string"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name.
    ///
    /// Default: `"session_id"`
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session lifetime in seconds, written into the session's `expires`
    /// key on every response.
    ///
    /// Default: `86400` (24 hours)
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,

    /// Cookie Max-Age in seconds.
    ///
    /// If not set, the cookie lasts until the browser closes.
    #[serde(default)]
    pub cookie_expiry_secs: Option<u64>,

    /// Cookie path.
    ///
    /// Default: `"/"`
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Cookie domain (optional).
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Secure cookie flag (HTTPS only).
    ///
    /// Default: `true`
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// HttpOnly cookie flag.
    ///
    /// Default: `true`
    #[serde(default = "default_http_only")]
    pub http_only: bool,

    /// SameSite cookie policy: `"strict"`, `"lax"` or `"none"`.
    ///
    /// Default: `"lax"`
    #[serde(default = "default_same_site")]
    pub same_site: String,

    /// Session storage backend.
    ///
    /// Default: `"memory"`
    #[serde(default)]
    pub storage: SessionStorage,

    /// Signing secret, required when `storage = "cookie"`.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            expiry_secs: default_expiry_secs(),
            cookie_expiry_secs: None,
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            secure: default_secure(),
            http_only: default_http_only(),
            same_site: default_same_site(),
            storage: SessionStorage::default(),
            secret: None,
        }
    }
}

impl SessionConfig {
    /// Outbound session cookie carrying `token`.
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        let same_site = match self.same_site.to_lowercase().as_str() {
            "strict" => SameSite::Strict,
            "none" => SameSite::None,
            _ => SameSite::Lax,
        };

        let mut cookie = Cookie::new(self.cookie_name.clone(), token);
        cookie.set_path(self.cookie_path.clone());
        cookie.set_secure(self.secure);
        cookie.set_http_only(self.http_only);
        cookie.set_same_site(same_site);
        if let Some(domain) = &self.cookie_domain {
            cookie.set_domain(domain.clone());
        }
        if let Some(secs) = self.cookie_expiry_secs {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX);
            cookie.set_max_age(time::Duration::seconds(secs));
        }
        cookie
    }

    /// Construct the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if `storage = "cookie"` and no secret is configured.
    pub fn build_store(&self) -> Result<Arc<dyn SessionStore>> {
        match self.storage {
            SessionStorage::Memory => Ok(Arc::new(MemoryStore::new())),
            SessionStorage::Cookie => {
                let secret = self.secret.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
                    Error::Session("cookie session storage requires `session.secret`".to_string())
                })?;
                Ok(Arc::new(CookieStore::new(secret)))
            }
        }
    }
}

// Default value functions
fn default_cookie_name() -> String {
    "session_id".to_string()
}

fn default_expiry_secs() -> u64 {
    86400 // 24 hours
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_secure() -> bool {
    true
}

fn default_http_only() -> bool {
    true
}

fn default_same_site() -> String {
    "lax".to_string()
}
