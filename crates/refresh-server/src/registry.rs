//! Connected client bookkeeping.
//!
//! [`ClientRegistry`] is the only structure shared between sessions and the
//! dispatcher. The table is a sharded [`DashMap`], and [`ClientRegistry::broadcast`]
//! copies the outbox senders out of it before awaiting, so no shard lock is
//! ever held across a send. Registering or unregistering during a broadcast
//! is safe: new clients are picked up by the next broadcast, and removed
//! clients fail their send fast because their session dropped the receiver.

use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SessionError;

/// Server-generated client identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message pushed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadMessage {
    /// Something under the watch root changed.
    Reload,
}

impl ReloadMessage {
    /// Wire text of the message.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
        }
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients whose outbox accepted the message.
    pub delivered: usize,
    /// Clients dropped because the send failed or timed out.
    pub dropped: usize,
}

/// One registered client.
struct ClientEntry {
    outbox: mpsc::Sender<ReloadMessage>,
    cancel: CancellationToken,
}

/// Concurrency-safe table of connected clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientEntry>,
    shutdown: CancellationToken,
    write_timeout: Duration,
}

impl ClientRegistry {
    /// Create an empty registry.
    ///
    /// Client cancellation tokens are children of `shutdown`, so cancelling it
    /// tears down every session. `write_timeout` bounds each per-client send.
    #[must_use]
    pub fn new(shutdown: CancellationToken, write_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            shutdown,
            write_timeout,
        }
    }

    /// Register a client and return its cancellation token.
    ///
    /// Re-registering an existing id replaces (and cancels) the old entry.
    pub fn register(&self, id: ClientId, outbox: mpsc::Sender<ReloadMessage>) -> CancellationToken {
        let cancel = self.shutdown.child_token();
        let entry = ClientEntry {
            outbox,
            cancel: cancel.clone(),
        };
        if let Some(previous) = self.clients.insert(id, entry) {
            previous.cancel.cancel();
        }
        cancel
    }

    /// Remove a client. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    /// Returns `true` if the client is registered.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send `message` to every registered client.
    ///
    /// Sends run concurrently, each bounded by the write timeout. A client
    /// whose send fails is removed and its session cancelled; the others are
    /// unaffected.
    pub async fn broadcast(&self, message: ReloadMessage) -> BroadcastReport {
        let targets: Vec<(ClientId, mpsc::Sender<ReloadMessage>)> = self
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().outbox.clone()))
            .collect();

        let sends = targets.into_iter().map(|(id, outbox)| async move {
            let result = match tokio::time::timeout(self.write_timeout, outbox.send(message)).await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(SessionError::Closed),
                Err(_) => Err(SessionError::Timeout(self.write_timeout)),
            };
            (id, result)
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::debug!(client_id = %id, error = %err, "Dropping client after failed send");
                    self.evict(&id);
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Remove a client and cancel its session.
    fn evict(&self, id: &ClientId) {
        if let Some((_, entry)) = self.clients.remove(id) {
            entry.cancel.cancel();
        }
    }
}
