//! # quire
//!
//! Server-side web pipeline built on axum: layout-composed templates across
//! several applications, before/after request hooks, and cookie-carried
//! sessions.
//!
//! ## Features
//!
//! - **Templates**: minijinja templates discovered per application, indexed by
//!   layout, format and name, compiled once at startup
//! - **Helpers**: membership test, reverse URLs, `nl2br`, `raw`, variant partials, date formatting
//! - **Hooks**: straight before/handler/after pipeline with content-type, session and access-log hooks
//! - **Sessions**: sliding expiry, memory or signed-cookie storage, graceful reset on bad input
//! - **Graceful shutdown**: Proper signal handling (SIGTERM, SIGINT)
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quire::prelude::*;
//!
//! struct Home;
//!
//! #[async_trait]
//! impl Handler for Home {
//!     async fn call(&self, ctx: &mut Context) -> Result<ActionResult> {
//!         ctx.session.insert("seen", "yes");
//!         ctx.render("home", serde_json::json!({ "title": "Welcome" }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Compile templates and install hooks
//!     let app = App::from_config(&config, Helpers::default())?;
//!
//!     // Create router
//!     let router = Router::new().route("/", get(app.endpoint(Home)));
//!
//!     // Run server
//!     Server::new(config).serve(router).await
//! }
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod result;
pub mod routing;
pub mod server;
pub mod session;
pub mod templates;

/// Commonly used types
pub mod prelude {
    pub use crate::app::{App, Handler};
    pub use crate::config::{Config, ServiceConfig};
    pub use crate::context::{Context, Request, Response};
    pub use crate::error::{BuildError, Error, Result};
    pub use crate::middleware::{
        Middleware, MiddlewareChain, RequestLogging, ResponseContentType, SessionMiddleware,
    };
    pub use crate::observability::init_tracing;
    pub use crate::result::{ActionResult, Content, Redirect};
    pub use crate::routing::{ReverseRouter, RouteTable, TruthyVariant, VariantSelector};
    pub use crate::server::Server;
    pub use crate::session::{
        CookieStore, MemoryStore, Session, SessionConfig, SessionIssue, SessionStore,
    };
    pub use crate::templates::{Helpers, TemplateIndex, TemplateSearchSpec};

    pub use axum::{
        routing::{get, post},
        Router,
    };
}
