//! Per-client WebSocket session.
//!
//! A session owns its socket and its cancellation token. It registers itself
//! on start, forwards reload messages from its outbox to the socket, and reads
//! the socket only to notice the peer going away. Whatever ends the session
//! (peer close, read or write error, write timeout, cancellation), the
//! teardown path is the same and safe to run after the registry has already
//! dropped the client.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use tokio::sync::mpsc;

use crate::error::SessionError;
use crate::registry::{ClientId, ClientRegistry};

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a session left the `Open` state.
#[derive(Debug)]
enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Session token cancelled by a failed broadcast or shutdown.
    Cancelled,
    /// Read or write failed.
    Error(SessionError),
}

/// Per-session delivery settings.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionConfig {
    /// Deadline for a single socket write.
    pub write_timeout: Duration,
    /// Outbox channel capacity.
    pub outbox_capacity: usize,
}

/// One connected client.
pub(crate) struct ConnectionSession {
    id: ClientId,
    registry: Arc<ClientRegistry>,
    config: SessionConfig,
    state: SessionState,
}

impl ConnectionSession {
    /// Create a session that will register into `registry` once running.
    pub(crate) fn new(registry: Arc<ClientRegistry>, config: SessionConfig) -> Self {
        Self {
            id: ClientId::new(),
            registry,
            config,
            state: SessionState::Connecting,
        }
    }

    /// Drive the session until the connection closes.
    pub(crate) async fn run(mut self, mut socket: WebSocket) {
        let (outbox, mut inbox) = mpsc::channel(self.config.outbox_capacity);
        let cancel = self.registry.register(self.id, outbox);
        self.transition(SessionState::Open);
        tracing::info!(
            client_id = %self.id,
            clients = self.registry.len(),
            "Client connected"
        );

        let reason = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break CloseReason::Cancelled,
                Some(message) = inbox.recv() => {
                    let frame = Message::Text(Utf8Bytes::from_static(message.as_str()));
                    if let Err(err) = self.write(&mut socket, frame).await {
                        break CloseReason::Error(err);
                    }
                }
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break CloseReason::Error(SessionError::Socket(err)),
                },
            }
        };

        self.transition(SessionState::Closing);
        self.registry.unregister(&self.id);
        cancel.cancel();
        if matches!(reason, CloseReason::Cancelled) {
            // Best effort; the peer may already be unreachable
            let _ = self.write(&mut socket, Message::Close(None)).await;
        }
        drop(socket);
        self.transition(SessionState::Closed);

        match reason {
            CloseReason::Error(err) => tracing::info!(
                client_id = %self.id,
                error = %err,
                "Client disconnected after error"
            ),
            reason => tracing::info!(
                client_id = %self.id,
                ?reason,
                "Client disconnected"
            ),
        }
    }

    /// Write one frame within the write deadline.
    async fn write(&self, socket: &mut WebSocket, frame: Message) -> Result<(), SessionError> {
        match tokio::time::timeout(self.config.write_timeout, socket.send(frame)).await {
            Ok(result) => result.map_err(SessionError::Socket),
            Err(_) => Err(SessionError::Timeout(self.config.write_timeout)),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(client_id = %self.id, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}
