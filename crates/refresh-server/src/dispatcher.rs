//! Reload dispatcher.
//!
//! Single control loop that turns filesystem events into broadcasts. Events
//! are not debounced: every event is one broadcast, in the order the watcher
//! reported them, so each client sees reloads in observation order.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::registry::{ClientRegistry, ReloadMessage};
use crate::watcher::DirectoryWatcher;

/// Consumes watcher events and broadcasts reloads.
pub struct ReloadDispatcher {
    watcher: DirectoryWatcher,
    registry: Arc<ClientRegistry>,
    verbose: bool,
}

impl ReloadDispatcher {
    /// Create a dispatcher over a started watcher.
    ///
    /// With `verbose`, every change is logged at info level instead of debug.
    #[must_use]
    pub fn new(watcher: DirectoryWatcher, registry: Arc<ClientRegistry>, verbose: bool) -> Self {
        Self {
            watcher,
            registry,
            verbose,
        }
    }

    /// Run until `shutdown` is cancelled or the watcher stops.
    ///
    /// The watcher is dropped on return, releasing its OS resources.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                signal = self.watcher.recv() => match signal {
                    Some(Ok(event)) => {
                        if self.verbose {
                            tracing::info!(kind = ?event.kind, paths = ?event.paths, "Detected change");
                        } else {
                            tracing::debug!(kind = ?event.kind, paths = ?event.paths, "Detected change");
                        }
                        let report = self.registry.broadcast(ReloadMessage::Reload).await;
                        tracing::debug!(
                            delivered = report.delivered,
                            dropped = report.dropped,
                            "Broadcast reload"
                        );
                    }
                    Some(Err(err)) => tracing::warn!(error = %err, "Watcher error"),
                    None => {
                        tracing::warn!("File watcher stopped unexpectedly");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            directories = self.watcher.watched_dirs().len(),
            "Stopped watching for changes"
        );
    }
}
