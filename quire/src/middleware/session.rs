//! Session load/validate/save hook

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::Middleware;
use crate::{
    context::Context,
    error::Result,
    session::{load_session, Session, SessionConfig, SessionStore},
};

/// Resolves the inbound session before the handler and persists it after.
///
/// Loading never fails the request: an absent, expired or malformed session
/// is logged and replaced by an empty one. Saving happens on every request,
/// so the expiry slides forward even when the handler never touched the
/// session.
#[derive(Clone)]
pub struct SessionMiddleware {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("cookie_name", &self.config.cookie_name)
            .field("storage", &self.config.storage)
            .finish_non_exhaustive()
    }
}

impl SessionMiddleware {
    /// Hook backed by `store`
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Hook backed by the store `config` selects.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let store = config.build_store()?;
        Ok(Self::new(store, config))
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn before(&self, ctx: &mut Context) -> Result<()> {
        let token = ctx.request.cookie(&self.config.cookie_name);
        let now = Utc::now().timestamp();

        ctx.session = match load_session(self.store.as_ref(), token.as_deref(), now).await {
            Ok(session) => session,
            Err(issue) if issue.is_expected() => {
                tracing::info!("{}", issue);
                Session::new()
            }
            Err(issue) => {
                tracing::error!("{}", issue);
                Session::new()
            }
        };
        Ok(())
    }

    async fn after(&self, ctx: &mut Context) -> Result<()> {
        let lifetime = i64::try_from(self.config.expiry_secs).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(lifetime);
        ctx.session.set_expires(expires);

        let previous = ctx.request.cookie(&self.config.cookie_name);
        let token = self.store.save(previous.as_deref(), &ctx.session).await?;
        ctx.response.set_cookie(&self.config.cookie(token))
    }
}
