//! Before/after hooks wrapped around every handler call
//!
//! The chain is a straight pipeline, not a nested stack: every `before`
//! runs in declared order, then the handler, then every `after` in the same
//! declared order.
//!
//! ```text
//! before(m1) → before(m2) → handler → after(m1) → after(m2)
//! ```

pub mod content_type;
pub mod logging;
pub mod session;

pub use content_type::ResponseContentType;
pub use logging::RequestLogging;
pub use session::SessionMiddleware;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{app::Handler, context::Context, error::Result, result::ActionResult};

/// A pair of hooks around the handler.
///
/// Both hooks default to doing nothing. An error from either aborts the
/// request and propagates to the driver unchanged.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Runs before the handler
    async fn before(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    /// Runs after the handler. The result's status and headers are already
    /// on the response; its body is not.
    async fn after(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of hooks.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Default for MiddlewareChain {
    /// Chain holding only [`ResponseContentType`]
    fn default() -> Self {
        Self::empty().with(ResponseContentType)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewareChain {
    /// Chain with no hooks at all
    pub fn empty() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Append a hook
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append an already shared hook
    #[must_use]
    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Number of hooks
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain has no hooks
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run every `before`, the handler, then every `after`.
    pub async fn run(&self, ctx: &mut Context, handler: &dyn Handler) -> Result<ActionResult> {
        for middleware in &self.middlewares {
            middleware.before(ctx).await?;
        }

        let mut result = handler.call(ctx).await?;
        result.write_head(&mut ctx.response)?;

        for middleware in &self.middlewares {
            middleware.after(ctx).await?;
        }

        Ok(result)
    }
}
