//! Live reload server for refresh.
//!
//! Watches a directory tree and pushes a `"reload"` text message over
//! WebSocket to every connected client whenever something in it changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use refresh_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         watch_root: PathBuf::from("site"),
//!         ignore: vec!["node_modules".to_owned()],
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! filesystem ──notify──► DirectoryWatcher ──► ReloadDispatcher
//!                                                   │
//!                                                   ▼ broadcast
//! Browser ◄──WebSocket── ConnectionSession ◄── ClientRegistry
//!    │                          ▲
//!    └──HTTP upgrade──► axum ───┘ register / unregister
//! ```
//!
//! Only watcher setup failures are fatal. Errors on one connection tear down
//! that connection only; watcher faults after startup are logged.

mod app;
mod dispatcher;
mod error;
mod handlers;
mod middleware;
mod registry;
mod session;
mod state;
mod watcher;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use dispatcher::ReloadDispatcher;
pub use error::{ServerError, SessionError, SetupError, UpgradeError, WatchError};
pub use middleware::origin::OriginPolicy;
pub use registry::{BroadcastReport, ClientId, ClientRegistry, ReloadMessage};
pub use watcher::{DirectoryWatcher, IgnoreMatcher, WatchEvent, WatchEventKind, WatchOptions};

use session::SessionConfig;
use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Path of the WebSocket upgrade endpoint.
    pub endpoint: String,
    /// Directory to watch.
    pub watch_root: PathBuf,
    /// Paths excluded from watching, matched exactly.
    pub ignore: Vec<String>,
    /// Register directories created after startup.
    pub rescan_new_dirs: bool,
    /// Which origins may upgrade.
    pub origin_policy: OriginPolicy,
    /// Deadline for a single send to one client.
    pub write_timeout: Duration,
    /// Messages buffered per client.
    pub outbox_capacity: usize,
    /// How long shutdown waits for sessions to close.
    pub shutdown_grace: Duration,
    /// Log every detected change at info level.
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            endpoint: "/ws".to_owned(),
            watch_root: PathBuf::from("."),
            ignore: Vec::new(),
            rescan_new_dirs: false,
            origin_policy: OriginPolicy::Any,
            write_timeout: Duration::from_secs(2),
            outbox_capacity: 16,
            shutdown_grace: Duration::from_secs(5),
            verbose: false,
        }
    }
}

/// A bound server with its watcher registered, ready to run.
pub struct Server {
    listener: TcpListener,
    watcher: DirectoryWatcher,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
    config: ServerConfig,
}

impl Server {
    /// Register the watch root and bind the listener.
    ///
    /// `shutdown` stops the server when cancelled; see [`Server::run`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Endpoint`] if the endpoint cannot be routed,
    /// [`ServerError::Setup`] if the watch root cannot be registered,
    /// or an address/I/O error if the listener cannot be bound.
    pub async fn bind(config: ServerConfig, shutdown: CancellationToken) -> Result<Self, ServerError> {
        if !config.endpoint.starts_with('/') || config.endpoint == refresh_config::HEALTH_PATH {
            return Err(ServerError::Endpoint(config.endpoint));
        }

        let ignore = IgnoreMatcher::new(&config.watch_root, config.ignore.iter().cloned());
        let options = WatchOptions {
            rescan_new_dirs: config.rescan_new_dirs,
            ..WatchOptions::default()
        };
        let watcher = DirectoryWatcher::start(&config.watch_root, ignore, options)?;

        let addrs = resolve_listen_addrs(&config.host, config.port).await?;
        let listener = TcpListener::bind(addrs.as_slice()).await?;

        let registry = Arc::new(ClientRegistry::new(shutdown.clone(), config.write_timeout));

        Ok(Self {
            listener,
            watcher,
            registry,
            shutdown,
            config,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared client registry.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until the shutdown token is cancelled.
    ///
    /// On shutdown the listener stops accepting, every session is cancelled
    /// and the dispatcher drops the watcher. The method returns once all of
    /// them are done or the grace period has elapsed, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails before shutdown is requested.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            watcher,
            registry,
            shutdown,
            config,
        } = self;

        let sessions = TaskTracker::new();
        let state = Arc::new(AppState {
            registry: Arc::clone(&registry),
            origin_policy: config.origin_policy.clone(),
            session_config: SessionConfig {
                write_timeout: config.write_timeout,
                outbox_capacity: config.outbox_capacity,
            },
            sessions: sessions.clone(),
        });
        let app = app::create_router(state, &config.endpoint);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, endpoint = %config.endpoint, "Starting server");
        }

        let dispatcher = tokio::spawn(
            ReloadDispatcher::new(watcher, Arc::clone(&registry), config.verbose)
                .run(shutdown.clone()),
        );

        let signal = shutdown.clone().cancelled_owned();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
        });

        let finished_early = tokio::select! {
            result = &mut server => Some(result),
            () = shutdown.cancelled() => None,
        };

        let served = if let Some(result) = finished_early {
            result
        } else {
            tracing::info!(clients = registry.len(), "Shutting down");
            match tokio::time::timeout(config.shutdown_grace, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Listener did not stop within grace period");
                    server.abort();
                    Ok(Ok(()))
                }
            }
        };

        // Covers the early-exit path too: sessions and dispatcher must stop
        shutdown.cancel();
        sessions.close();
        let drained = tokio::time::timeout(config.shutdown_grace, async {
            let _ = dispatcher.await;
            sessions.wait().await;
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                clients = registry.len(),
                "Sessions still open after grace period"
            );
        } else {
            tracing::info!("Server stopped");
        }

        served?.map_err(ServerError::Io)
    }
}

/// Resolve `host` to the addresses it names.
///
/// Accepts IP literals (IPv6 without brackets) and host names such as
/// `localhost`. Binding tries each address in turn.
async fn resolve_listen_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, ServerError> {
    let unresolved = || ServerError::Address {
        host: host.to_owned(),
        port,
    };
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| unresolved())?
        .collect();
    if addrs.is_empty() {
        return Err(unresolved());
    }
    Ok(addrs)
}

/// Run the server until Ctrl-C or SIGTERM.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the watcher cannot be set up or the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();
    let server = Server::bind(config, shutdown.clone()).await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    server.run().await
}

/// Wait for shutdown signal (Ctrl-C, or SIGTERM on unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from refresh config.
#[must_use]
pub fn server_config_from_config(config: &refresh_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        endpoint: config.server.endpoint.clone(),
        watch_root: config.watch_resolved.root.clone(),
        ignore: config.watch_resolved.ignore.clone(),
        rescan_new_dirs: config.watch_resolved.rescan_new_dirs,
        origin_policy: OriginPolicy::from_allowed(config.server.allowed_origins.clone()),
        write_timeout: config.clients.write_timeout(),
        outbox_capacity: config.clients.outbox_capacity,
        shutdown_grace: config.server.shutdown_grace(),
        verbose: config.verbose,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_default_config() {
        let config = refresh_config::Config::default();

        let server = server_config_from_config(&config);

        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8080);
        assert_eq!(server.endpoint, "/ws");
        assert_eq!(server.watch_root, PathBuf::from("."));
        assert!(server.ignore.is_empty());
        assert_eq!(server.origin_policy, OriginPolicy::Any);
        assert_eq!(server.write_timeout, Duration::from_secs(2));
        assert_eq!(server.shutdown_grace, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_listen_addrs_accepts_loopback_forms() {
        for host in ["127.0.0.1", "localhost", "::1"] {
            let addrs = resolve_listen_addrs(host, 8080).await.unwrap();

            assert!(addrs.iter().all(|a| a.ip().is_loopback()), "{host}: {addrs:?}");
            assert!(addrs.iter().all(|a| a.port() == 8080));
        }
    }

    #[tokio::test]
    async fn test_bind_localhost() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            host: "localhost".to_owned(),
            port: 0,
            watch_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let server = Server::bind(config, CancellationToken::new()).await.unwrap();

        assert!(server.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_resolve_listen_addrs_rejects_garbage() {
        let result = resolve_listen_addrs("not a host!", 8080).await;

        assert!(matches!(result, Err(ServerError::Address { port: 8080, .. })));
    }

    #[tokio::test]
    async fn test_bind_rejects_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            port: 0,
            endpoint: "/health".to_owned(),
            watch_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let result = Server::bind(config, CancellationToken::new()).await;

        assert!(matches!(result, Err(ServerError::Endpoint(path)) if path == "/health"));
    }

    #[test]
    fn test_server_config_from_config_with_origins() {
        let mut config = refresh_config::Config::default();
        config.server.allowed_origins = vec!["http://localhost:3000".to_owned()];
        config.watch_resolved.ignore = vec!["dist".to_owned()];

        let server = server_config_from_config(&config);

        assert_eq!(
            server.origin_policy,
            OriginPolicy::AllowList(vec!["http://localhost:3000".to_owned()])
        );
        assert_eq!(server.ignore, vec!["dist".to_owned()]);
    }
}
