//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the framework error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while building the template index.
///
/// Every variant is fatal: the index under construction is discarded and
/// never published.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Two layout files resolve to the same (name, format) pair
    #[error("duplicate name of layout file:\n  1. {}\n  2. {}", first.display(), second.display())]
    DuplicateLayout {
        /// Path discovered first
        first: PathBuf,
        /// Conflicting path
        second: PathBuf,
    },

    /// Two content files resolve to the same (format, name) pair
    #[error("duplicate name of template file:\n  1. {}\n  2. {}", first.display(), second.display())]
    DuplicateTemplate {
        /// Path discovered first
        first: PathBuf,
        /// Conflicting path
        second: PathBuf,
    },

    /// Walking or reading a template directory failed
    #[error("{}: {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Template source failed to parse
    #[error("{}: {source}", path.display())]
    Parse {
        /// Source file of the broken template
        path: PathBuf,
        /// Parser error
        #[source]
        source: Box<minijinja::Error>,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, source: minijinja::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Main error type for the framework
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Template index could not be built
    #[error("Template build error: {0}")]
    Build(#[from] BuildError),

    /// Template rendering failed (including helper usage errors)
    #[error("Render error: {0}")]
    Render(Box<minijinja::Error>),

    /// Session persistence failed
    #[error("Session error: {0}")]
    Session(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(Box<axum::http::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Error::Http(e) => {
                tracing::error!("HTTP error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "HTTP_ERROR",
                    "Response construction failed".to_string(),
                )
            }
            Error::Render(e) => {
                tracing::error!("Template rendering error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RENDER_ERROR",
                    "Template rendering failed".to_string(),
                )
            }
            Error::Session(msg) => {
                tracing::error!("Session error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SESSION_ERROR",
                    "Session operation failed".to_string(),
                )
            }
            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Configuration error".to_string(),
                )
            }
            Error::Build(e) => {
                tracing::error!("Template build error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "BUILD_ERROR",
                    "Template build failed".to_string(),
                )
            }
            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "I/O operation failed".to_string(),
                )
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse::with_code(status, code, message);
        (status, Json(body)).into_response()
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::Render(Box::new(err))
    }
}

impl From<axum::http::Error> for Error {
    fn from(err: axum::http::Error) -> Self {
        Error::Http(Box::new(err))
    }
}
