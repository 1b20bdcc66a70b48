//! Application driver: turns an axum request into a context, runs the hook
//! chain around a handler, and writes the handler's result.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quire::prelude::*;
//!
//! struct Index;
//!
//! #[async_trait]
//! impl Handler for Index {
//!     async fn call(&self, ctx: &mut Context) -> Result<ActionResult> {
//!         ctx.render("index", serde_json::json!({ "title": "Home" }))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let config = Config::load()?;
//! let app = App::from_config(&config, Helpers::default())?;
//! let router = Router::new().route("/", get(app.endpoint(Index)));
//! Server::new(config).serve(router).await
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    config::Config,
    context::{Context, Request},
    error::Result,
    middleware::{Middleware, MiddlewareChain, RequestLogging, SessionMiddleware},
    result::ActionResult,
    templates::{Helpers, TemplateIndex, TemplateSearchSpec},
};
use axum::response::IntoResponse;

/// Application code invoked once per request.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produce the request's result. Hooks have already run their `before`.
    async fn call(&self, ctx: &mut Context) -> Result<ActionResult>;
}

/// One application: its compiled templates and its hook chain.
///
/// Cheap to clone; clones share the template index and chain.
#[derive(Debug, Clone)]
pub struct App {
    name: String,
    templates: Arc<TemplateIndex>,
    middlewares: Arc<MiddlewareChain>,
    default_layout: String,
}

impl App {
    /// Application `name` over `templates` with the default chain
    pub fn new(name: impl Into<String>, templates: Arc<TemplateIndex>) -> Self {
        Self {
            name: name.into(),
            templates,
            middlewares: Arc::new(MiddlewareChain::default()),
            default_layout: String::new(),
        }
    }

    /// Build the template index and hook chain described by `config`.
    ///
    /// The chain is the default content-type hook, then the session hook
    /// and the access log unless disabled in `[service]`.
    ///
    /// # Errors
    ///
    /// Fails on any template build error or an unusable session store
    /// configuration.
    pub fn from_config(config: &Config, helpers: Helpers) -> Result<Self> {
        let templates = TemplateIndex::builder(helpers)
            .specs(config.templates.iter().cloned())
            .build()?;

        let mut chain = MiddlewareChain::default();
        if config.service.sessions {
            chain = chain.with(SessionMiddleware::from_config(config.session.clone())?);
        }
        if config.service.access_log {
            chain = chain.with(RequestLogging);
        }

        tracing::info!(
            app = %config.service.name,
            hooks = chain.len(),
            "application ready"
        );

        Ok(Self::new(config.service.name.clone(), Arc::new(templates))
            .with_middlewares(chain)
            .with_default_layout(config.service.default_layout.clone()))
    }

    /// Replace the hook chain
    #[must_use]
    pub fn with_middlewares(mut self, chain: MiddlewareChain) -> Self {
        self.middlewares = Arc::new(chain);
        self
    }

    /// Append one hook to the chain
    #[must_use]
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        let chain = (*self.middlewares).clone().with(middleware);
        self.middlewares = Arc::new(chain);
        self
    }

    /// Layout applied when a handler does not choose one
    #[must_use]
    pub fn with_default_layout(mut self, layout: impl Into<String>) -> Self {
        self.default_layout = layout.into();
        self
    }

    /// Application name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared template index
    pub fn templates(&self) -> &Arc<TemplateIndex> {
        &self.templates
    }

    /// Rebuild templates for `specs`, keeping every application already compiled.
    ///
    /// Returns a new `App`; requests in flight keep using the old index.
    pub fn reload_templates(
        &self,
        specs: impl IntoIterator<Item = TemplateSearchSpec>,
        helpers: Helpers,
    ) -> Result<Self> {
        let templates = TemplateIndex::builder(helpers)
            .reuse(&self.templates)
            .specs(specs)
            .build()?;
        Ok(Self {
            templates: Arc::new(templates),
            ..self.clone()
        })
    }

    /// Context for a new request flow
    pub fn context(&self, request: axum::extract::Request) -> Context {
        let mut ctx = Context::new(
            self.name.clone(),
            Arc::clone(&self.templates),
            Request::from(request),
        );
        ctx.layout = self.default_layout.clone();
        ctx
    }

    /// Serve one request with `handler`.
    ///
    /// Failures from hooks, the handler or writing the result become the
    /// error's HTTP response.
    pub async fn dispatch(
        &self,
        request: axum::extract::Request,
        handler: &dyn Handler,
    ) -> axum::response::Response {
        let mut ctx = self.context(request);
        match self.process(&mut ctx, handler).await {
            Ok(()) => ctx.response.into_response(),
            Err(e) => e.into_response(),
        }
    }

    async fn process(&self, ctx: &mut Context, handler: &dyn Handler) -> Result<()> {
        let result = self.middlewares.run(ctx, handler).await?;
        result.proc(&mut ctx.response).await
    }

    /// Adapt `handler` into an axum handler function.
    pub fn endpoint<H: Handler + 'static>(
        &self,
        handler: H,
    ) -> impl Fn(axum::extract::Request) -> BoxFuture<'static, axum::response::Response>
           + Clone
           + Send
           + Sync
           + 'static {
        let app = self.clone();
        let handler = Arc::new(handler);
        move |request: axum::extract::Request| {
            let app = app.clone();
            let handler = Arc::clone(&handler);
            let future: BoxFuture<'static, axum::response::Response> =
                Box::pin(async move { app.dispatch(request, handler.as_ref()).await });
            future
        }
    }
}
