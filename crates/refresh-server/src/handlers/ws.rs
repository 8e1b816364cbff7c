//! WebSocket upgrade endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::HeaderMap;
use axum::http::header::ORIGIN;
use axum::response::{IntoResponse, Response};

use crate::error::UpgradeError;
use crate::session::ConnectionSession;
use crate::state::AppState;

/// Handle a WebSocket upgrade request.
///
/// The origin policy is checked before the handshake. Each upgraded
/// connection runs as a [`ConnectionSession`] tracked for shutdown.
pub(crate) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, UpgradeError> {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origin_policy.allows(origin) {
        return Err(UpgradeError::ForbiddenOrigin(origin.map(ToOwned::to_owned)));
    }

    let ws = ws?;
    let session = ConnectionSession::new(Arc::clone(&state.registry), state.session_config);
    let sessions = state.sessions.clone();

    Ok(ws
        .on_failed_upgrade(|err| {
            tracing::warn!(error = %UpgradeError::Failed(err), "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| sessions.track_future(session.run(socket)))
        .into_response())
}
