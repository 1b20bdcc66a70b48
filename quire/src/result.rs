//! Handler outcomes and how each is written onto the response

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use axum::http::{
    header::{IntoHeaderName, LOCATION},
    HeaderMap, HeaderValue, StatusCode,
};
use tokio::io::AsyncRead;

use crate::{context::Response, error::Result};

/// What a handler produced.
///
/// Exactly one is created per request and consumed by [`proc`](Self::proc).
#[derive(Debug)]
pub enum ActionResult {
    /// Body bytes
    Content(Content),
    /// `Location` redirect
    Redirect(Redirect),
}

impl ActionResult {
    /// Apply status and headers to `response` without writing any body.
    ///
    /// Runs before the `after` hooks so they observe the final status.
    /// Calling [`proc`](Self::proc) afterwards does not apply them twice.
    pub fn write_head(&mut self, response: &mut Response) -> Result<()> {
        match self {
            Self::Content(content) => {
                content.write_head(response);
                Ok(())
            }
            Self::Redirect(redirect) => redirect.write_head(response),
        }
    }

    /// Write this result onto `response`.
    pub async fn proc(self, response: &mut Response) -> Result<()> {
        match self {
            Self::Content(content) => content.proc(response).await,
            Self::Redirect(redirect) => redirect.proc(response),
        }
    }
}

impl From<Content> for ActionResult {
    fn from(content: Content) -> Self {
        Self::Content(content)
    }
}

impl From<Redirect> for ActionResult {
    fn from(redirect: Redirect) -> Self {
        Self::Redirect(redirect)
    }
}

/// Readable body plus optional status and extra headers.
///
/// The body is owned: it is dropped, and any file or socket behind it
/// closed, when [`proc`](Self::proc) returns, whether or not copying
/// succeeded.
pub struct Content {
    body: Pin<Box<dyn AsyncRead + Send>>,
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Content {
    /// Content streamed from `body`
    pub fn new(body: impl AsyncRead + Send + 'static) -> Self {
        Self {
            body: Box::pin(body),
            status: None,
            headers: HeaderMap::new(),
        }
    }

    /// Override the response status
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a response header
    #[must_use]
    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    fn write_head(&mut self, response: &mut Response) {
        if let Some(status) = self.status.take() {
            response.set_status(status);
        }
        response
            .headers_mut()
            .extend(std::mem::take(&mut self.headers));
    }

    /// Copy the body onto `response`.
    pub async fn proc(mut self, response: &mut Response) -> Result<()> {
        self.write_head(response);
        tokio::io::copy(&mut self.body, response.body_mut()).await?;
        Ok(())
    }
}

impl From<Vec<u8>> for Content {
    fn from(body: Vec<u8>) -> Self {
        Self::new(Cursor::new(body))
    }
}

impl From<String> for Content {
    fn from(body: String) -> Self {
        Self::from(body.into_bytes())
    }
}

impl From<&'static str> for Content {
    fn from(body: &'static str) -> Self {
        Self::new(body.as_bytes())
    }
}

/// Redirect to another URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Target written into `Location`
    pub url: String,
    /// `301 Moved Permanently` instead of `302 Found`
    pub permanently: bool,
}

impl Redirect {
    /// Redirect to `url`
    pub fn new(url: impl Into<String>, permanently: bool) -> Self {
        Self {
            url: url.into(),
            permanently,
        }
    }

    fn write_head(&self, response: &mut Response) -> Result<()> {
        let location =
            HeaderValue::try_from(self.url.as_str()).map_err(axum::http::Error::from)?;
        response.set_status(if self.permanently {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        });
        response.headers_mut().insert(LOCATION, location);
        Ok(())
    }

    /// Set status and `Location`; no body is written.
    pub fn proc(self, response: &mut Response) -> Result<()> {
        self.write_head(response)
    }
}
