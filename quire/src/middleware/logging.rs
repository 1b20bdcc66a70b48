//! Access log

use async_trait::async_trait;

use super::Middleware;
use crate::{context::Context, error::Result};

/// Emits one log line per request: `"METHOD TARGET PROTOCOL" STATUS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogging;

#[async_trait]
impl Middleware for RequestLogging {
    async fn after(&self, ctx: &mut Context) -> Result<()> {
        let request = &ctx.request;
        let status = ctx.response.status().as_u16();
        tracing::info!(
            method = %request.method(),
            target = request.target(),
            protocol = request.protocol(),
            status,
            "\"{} {} {}\" {}",
            request.method(),
            request.target(),
            request.protocol(),
            status
        );
        Ok(())
    }
}
