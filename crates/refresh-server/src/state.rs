//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::middleware::origin::OriginPolicy;
use crate::registry::ClientRegistry;
use crate::session::SessionConfig;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Connected clients.
    pub(crate) registry: Arc<ClientRegistry>,
    /// Origins allowed to open a session.
    pub(crate) origin_policy: OriginPolicy,
    /// Delivery settings for new sessions.
    pub(crate) session_config: SessionConfig,
    /// Running sessions, drained on shutdown.
    pub(crate) sessions: TaskTracker,
}
