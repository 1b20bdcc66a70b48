//! Request-scoped state threaded through hooks and handlers

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, Method, StatusCode, Uri, Version,
    },
    response::IntoResponse,
};
use serde::Serialize;
use tower_sessions::cookie::Cookie;

use crate::{
    error::{Error, Result},
    result::{ActionResult, Content, Redirect},
    session::Session,
    templates::TemplateIndex,
};

/// Format used when a handler does not pick one.
pub const DEFAULT_FORMAT: &str = "html";

/// MIME type for a template format or file extension.
pub fn mime_type(format: &str) -> &'static str {
    match format {
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "css" => "text/css",
        "js" => "text/javascript",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Inbound request: head parts plus the not-yet-consumed body.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Body,
}

impl From<axum::extract::Request> for Request {
    fn from(request: axum::extract::Request) -> Self {
        let (parts, body) = request.into_parts();
        Self { parts, body }
    }
}

impl Request {
    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Request target as sent on the request line (path and query)
    pub fn target(&self) -> &str {
        self.parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
    }

    /// Protocol string, e.g. `HTTP/1.1`
    pub fn protocol(&self) -> &'static str {
        match self.parts.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// First value of header `name`, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Value of the inbound cookie `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
    }

    /// Request extensions (set by axum layers)
    pub fn extensions(&self) -> &axum::http::Extensions {
        &self.parts.extensions
    }

    /// Take the body, leaving an empty one behind
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }
}

/// Outbound response under construction.
///
/// The `Content-Type` header is only written from [`content_type`](Self::content_type)
/// by the content-type hook, so handlers set the field, not the header.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    /// Media type written into `Content-Type` after the handler ran
    pub content_type: String,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type: mime_type(DEFAULT_FORMAT).to_string(),
            body: Vec::new(),
        }
    }
}

impl Response {
    /// Empty `200 OK` HTML response
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Replace the status code
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &Cookie<'_>) -> Result<()> {
        let value = HeaderValue::try_from(cookie.to_string()).map_err(axum::http::Error::from)?;
        self.headers.append(SET_COOKIE, value);
        Ok(())
    }

    /// Body written so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Writable body sink
    pub fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.body
    }

    /// Apply [`content_type`](Self::content_type) to the header map.
    pub(crate) fn apply_content_type(&mut self) -> Result<()> {
        let value =
            HeaderValue::try_from(self.content_type.as_str()).map_err(axum::http::Error::from)?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Everything one request flow owns while it runs.
///
/// Created by the application driver, mutated in place by each hook and the
/// handler, and dropped once the response has been produced.
#[derive(Debug)]
pub struct Context {
    /// Inbound request
    pub request: Request,
    /// Response under construction
    pub response: Response,
    /// Session resolved by the session hook (empty without one)
    pub session: Session,
    /// Layout applied by [`render`](Self::render); empty for none
    pub layout: String,
    /// Template format, also used to pick the response media type
    pub format: String,
    app: String,
    templates: Arc<TemplateIndex>,
}

impl Context {
    /// Fresh context for `request` served by application `app`
    pub fn new(app: impl Into<String>, templates: Arc<TemplateIndex>, request: Request) -> Self {
        Self {
            request,
            response: Response::new(),
            session: Session::new(),
            layout: String::new(),
            format: DEFAULT_FORMAT.to_string(),
            app: app.into(),
            templates,
        }
    }

    /// Name of the serving application
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Shared template index
    pub fn templates(&self) -> &Arc<TemplateIndex> {
        &self.templates
    }

    /// Render template `name` in the current layout and format.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no such template is compiled, or
    /// [`Error::Render`] if evaluation fails.
    pub fn render<S: Serialize>(&mut self, name: &str, data: S) -> Result<ActionResult> {
        let body = self.render_template(&self.layout, name, data)?;
        self.response.content_type = mime_type(&self.format).to_string();
        Ok(Content::from(body).into())
    }

    fn render_template<S: Serialize>(&self, layout: &str, name: &str, data: S) -> Result<String> {
        let template = self
            .templates
            .get(&self.app, layout, name, &self.format)
            .ok_or_else(|| {
                Error::NotFound(TemplateIndex::ident(&self.app, layout, name, &self.format))
            })?;
        Ok(template.render(data)?)
    }

    /// Plain-text response
    pub fn render_text(&mut self, text: impl Into<String>) -> ActionResult {
        self.response.content_type = mime_type("txt").to_string();
        Content::from(text.into()).into()
    }

    /// JSON response from any serializable value
    pub fn render_json<S: Serialize>(&mut self, data: &S) -> Result<ActionResult> {
        let body = serde_json::to_vec(data)
            .map_err(|e| Error::Internal(format!("failed to encode JSON response: {e}")))?;
        self.response.content_type = mime_type("json").to_string();
        Ok(Content::from(body).into())
    }

    /// Error page for `status`.
    ///
    /// Renders `errors/<code>` in the current layout and format when it
    /// exists, otherwise falls back to the status reason as plain text.
    pub fn render_error(&mut self, status: StatusCode) -> Result<ActionResult> {
        self.response.set_status(status);
        let name = format!("errors/{}", status.as_u16());
        let found = self
            .templates
            .get(&self.app, &self.layout, &name, &self.format)
            .is_some();
        if found {
            return self.render(&name, ());
        }

        let reason = status.canonical_reason().unwrap_or("Unknown Status");
        Ok(self.render_text(reason))
    }

    /// Stream a file from disk, typed by its extension.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<ActionResult> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        self.response.content_type = mime_type(ext).to_string();
        Ok(Content::new(file).into())
    }

    /// Redirect to `url`, temporarily (302) or permanently (301)
    pub fn redirect(&self, url: impl Into<String>, permanently: bool) -> ActionResult {
        Redirect::new(url, permanently).into()
    }
}
