//! Error types.
//!
//! Only [`SetupError`] is fatal. Everything else is scoped to one request,
//! one client, or one watcher event and is logged where it happens.

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure while registering the watch root at startup.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The OS notification backend could not be created.
    #[error("Failed to create file watcher: {0}")]
    Watcher(#[source] notify::Error),
    /// A directory could not be listed.
    #[error("Failed to read directory {}: {source}", path.display())]
    ReadDir {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A directory could not be registered with the OS watcher.
    #[error("Failed to watch directory {}: {source}", path.display())]
    Register {
        /// Directory being registered.
        path: PathBuf,
        /// Underlying notify error.
        #[source]
        source: notify::Error,
    },
}

/// Watcher fault reported after startup.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Error surfaced by the notification backend (e.g. queue overflow).
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    /// A directory created after startup could not be registered.
    #[error("Failed to register new directory: {0}")]
    Rescan(#[from] SetupError),
}

/// Failure delivering to or reading from a single client.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client's session is gone.
    #[error("client session closed")]
    Closed,
    /// The send did not complete within the write deadline.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    /// Transport error on the WebSocket.
    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),
}

/// Failure upgrading an HTTP request to a WebSocket.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// The request origin is not allowed by the configured policy.
    #[error("origin {} is not allowed", .0.as_deref().unwrap_or("<none>"))]
    ForbiddenOrigin(Option<String>),
    /// The request is not a valid WebSocket handshake.
    #[error("invalid WebSocket handshake: {0}")]
    Rejected(#[from] WebSocketUpgradeRejection),
    /// The handshake was accepted but the connection upgrade failed.
    #[error("WebSocket upgrade failed: {0}")]
    Failed(axum::Error),
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Rejected WebSocket upgrade");
        match self {
            Self::ForbiddenOrigin(_) => StatusCode::FORBIDDEN.into_response(),
            Self::Rejected(rejection) => rejection.into_response(),
            Self::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Server error returned by [`run_server`](crate::run_server).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Watcher setup failed.
    #[error(transparent)]
    Setup(#[from] SetupError),
    /// Upgrade endpoint is not a usable route path.
    #[error("Invalid endpoint {0:?}: must start with / and not be {health}", health = refresh_config::HEALTH_PATH)]
    Endpoint(String),
    /// Listen host did not resolve to any address.
    #[error("Invalid listen address: {host}:{port}")]
    Address { host: String, port: u16 },
    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The HTTP server task panicked or was aborted.
    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
