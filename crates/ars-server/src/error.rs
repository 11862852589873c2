//! Error types for the HTTP server.

use ars_watch::WatchError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure serving a static file.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing exists at the requested path.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The path escapes the served directory or is not valid UTF-8.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(path) => (
                StatusCode::NOT_FOUND,
                json!({"error": "File not found", "path": path}),
            ),
            Self::InvalidPath(path) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Invalid path", "path": path}),
            ),
            Self::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": e.to_string()}),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Failure starting the server. The only error that ends the process.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The watched directory could not be watched.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// The listening socket could not be bound.
    #[error("Cannot listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

