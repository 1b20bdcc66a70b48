//! `Content-Type` assignment

use async_trait::async_trait;

use super::Middleware;
use crate::{context::Context, error::Result};

/// Writes the response's chosen media type into the `Content-Type` header
/// once the handler has run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseContentType;

#[async_trait]
impl Middleware for ResponseContentType {
    async fn after(&self, ctx: &mut Context) -> Result<()> {
        ctx.response.apply_content_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::tests::{get, test_context};
    use axum::http::header::CONTENT_TYPE;

    #[tokio::test]
    async fn test_sets_header_from_response() {
        let mut ctx = test_context(get("/"));
        ResponseContentType.before(&mut ctx).await.unwrap();
        assert!(ctx.response.headers().get(CONTENT_TYPE).is_none());

        ctx.response.content_type = "application/json".to_string();
        ResponseContentType.after(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers()[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_defaults_to_html() {
        let mut ctx = test_context(get("/"));
        ResponseContentType.after(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.headers()[CONTENT_TYPE], "text/html");
    }
}
