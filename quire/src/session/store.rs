//! Session store backends.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{Session, SessionIssue};
use crate::error::{Error, Result};

/// Persists sessions behind opaque tokens.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Decode the session identified by `token`.
    async fn load(&self, token: &str) -> std::result::Result<Session, SessionIssue>;

    /// Persist `session` and return the token the client should present next.
    ///
    /// `previous` is the token the client presented with this request, if any.
    /// Stores that keep server-side state use it to replace the old entry.
    async fn save(&self, previous: Option<&str>, session: &Session) -> Result<String>;
}

/// Process-local store keyed by random tokens.
///
/// Development only: sessions are lost on restart and are not shared
/// between instances.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Session>,
    minted: AtomicUsize,
}

/// Expired entries are swept after this many new tokens.
const PURGE_EVERY: usize = 256;

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions whose expiry is before `now` or unreadable.
    pub fn purge_expired(&self, now: i64) {
        self.sessions
            .retain(|_, session| session.expires().is_ok_and(|expires| expires >= now));
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, token: &str) -> std::result::Result<Session, SessionIssue> {
        self.sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(SessionIssue::Absent)
    }

    async fn save(&self, previous: Option<&str>, session: &Session) -> Result<String> {
        // Only tokens this store issued are reused; anything else gets a fresh one.
        if let Some(token) = previous {
            if let Some(mut entry) = self.sessions.get_mut(token) {
                *entry = session.clone();
                return Ok(token.to_string());
            }
        }

        if self.minted.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired(Utc::now().timestamp());
        }

        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), session.clone());
        Ok(token)
    }
}

/// Store that keeps the whole session in the token itself.
///
/// The token is `base64url(json) "." base64url(mac)`, where the MAC is a
/// BLAKE3 keyed hash under a key derived from the configured secret. The
/// payload is signed, not encrypted.
#[derive(Clone)]
pub struct CookieStore {
    key: [u8; 32],
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore").finish_non_exhaustive()
    }
}

const KEY_CONTEXT: &str = "quire 2024-01-01 session cookie signing";

impl CookieStore {
    /// Store signing with a key derived from `secret`
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        }
    }

    fn decode(&self, token: &str) -> std::result::Result<Session, String> {
        let (payload, mac) = token.split_once('.').ok_or("missing signature")?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| format!("invalid payload encoding: {e}"))?;
        let mac: [u8; 32] = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|e| format!("invalid signature encoding: {e}"))?
            .try_into()
            .map_err(|_| "invalid signature length".to_string())?;

        // blake3::Hash equality is constant-time
        if blake3::keyed_hash(&self.key, &payload) != blake3::Hash::from(mac) {
            return Err("signature mismatch".to_string());
        }

        serde_json::from_slice(&payload).map_err(|e| format!("invalid payload: {e}"))
    }
}

#[async_trait]
impl SessionStore for CookieStore {
    async fn load(&self, token: &str) -> std::result::Result<Session, SessionIssue> {
        self.decode(token).map_err(SessionIssue::Malformed)
    }

    async fn save(&self, _previous: Option<&str>, session: &Session) -> Result<String> {
        let payload = serde_json::to_vec(session)
            .map_err(|e| Error::Session(format!("failed to encode session: {e}")))?;
        let mac = blake3::keyed_hash(&self.key, &payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(mac.as_bytes())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EXPIRES_KEY;

    fn sample() -> Session {
        [("user", "ann"), (EXPIRES_KEY, "1700000000")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_memory_store_issues_new_token_per_client() {
        let store = MemoryStore::new();
        let first = store.save(None, &sample()).await.unwrap();
        let second = store.save(None, &sample()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.load(&first).await.unwrap(), sample());
        assert_eq!(store.load("unknown").await, Err(SessionIssue::Absent));
    }

    #[tokio::test]
    async fn test_memory_store_reuses_known_token() {
        let store = MemoryStore::new();
        let token = store.save(None, &Session::new()).await.unwrap();

        let again = store.save(Some(&token), &sample()).await.unwrap();
        assert_eq!(again, token);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&token).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_memory_store_ignores_foreign_token() {
        let store = MemoryStore::new();
        let token = store.save(Some("chosen-by-client"), &sample()).await.unwrap();
        assert_ne!(token, "chosen-by-client");
        assert_eq!(store.load("chosen-by-client").await, Err(SessionIssue::Absent));
    }

    #[tokio::test]
    async fn test_memory_store_purge() {
        let store = MemoryStore::new();
        store.save(None, &sample()).await.unwrap();
        store
            .save(None, &[(EXPIRES_KEY, "10")].into_iter().collect())
            .await
            .unwrap();
        store.save(None, &Session::new()).await.unwrap();
        store.purge_expired(1_000);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_sweeps_expired_while_minting() {
        let store = MemoryStore::new();
        let stale: Session = [(EXPIRES_KEY, "10")].into_iter().collect();
        for _ in 0..PURGE_EVERY {
            store.save(None, &stale).await.unwrap();
        }
        // The sweep runs before the last token is inserted
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cookie_store_carries_session() {
        let store = CookieStore::new("secret");
        let token = store.save(None, &sample()).await.unwrap();
        assert_eq!(store.load(&token).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_cookie_store_rejects_tampering() {
        let store = CookieStore::new("secret");
        let token = store.save(None, &sample()).await.unwrap();
        let (_, mac) = token.split_once('.').unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"user":"root","expires":"9999999999"}"#);
        let forged = format!("{forged_payload}.{mac}");
        assert!(matches!(
            store.load(&forged).await,
            Err(SessionIssue::Malformed(_))
        ));

        let other = CookieStore::new("other secret");
        assert!(matches!(other.load(&token).await, Err(SessionIssue::Malformed(_))));
        assert!(matches!(store.load("garbage").await, Err(SessionIssue::Malformed(_))));
    }
}
