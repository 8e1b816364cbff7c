//! Directory watching.
//!
//! [`DirectoryWatcher`] walks the watch root once at startup and registers
//! every directory that is not ignored with the OS notification backend, one
//! non-recursive watch per directory. Change events and backend faults are
//! bridged from the notify callback thread into tokio channels and consumed
//! with [`DirectoryWatcher::recv`].
//!
//! Directories created after startup are not registered unless
//! [`WatchOptions::rescan_new_dirs`] is set, and removed directories are never
//! pruned from the watched set.

mod ignore;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{SetupError, WatchError};

pub use ignore::IgnoreMatcher;

/// Default capacity of the event and error channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A file or directory appeared.
    Created,
    /// Content, metadata or name changed.
    Modified,
    /// A file or directory was deleted.
    Removed,
}

/// A filesystem change under a watched directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// Paths affected by the change.
    pub paths: Vec<PathBuf>,
    /// Kind of change.
    pub kind: WatchEventKind,
}

/// Watcher behavior switches.
#[derive(Clone, Copy, Debug)]
pub struct WatchOptions {
    /// Register directories reported by create events.
    pub rescan_new_dirs: bool,
    /// Capacity of the event and error channels.
    pub channel_capacity: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            rescan_new_dirs: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Convert a `notify::EventKind` to a `WatchEventKind`.
///
/// Returns `None` for access events (open, close) which don't change content.
fn watch_event_kind(kind: notify::EventKind) -> Option<WatchEventKind> {
    match kind {
        notify::EventKind::Create(_) => Some(WatchEventKind::Created),
        notify::EventKind::Modify(_) | notify::EventKind::Any => Some(WatchEventKind::Modified),
        notify::EventKind::Remove(_) => Some(WatchEventKind::Removed),
        notify::EventKind::Access(_) | notify::EventKind::Other => None,
    }
}

/// Recursive directory watcher.
///
/// Owns the OS watcher, so dropping it releases every registration.
pub struct DirectoryWatcher {
    root: PathBuf,
    ignore: IgnoreMatcher,
    watched: BTreeSet<PathBuf>,
    rescan_new_dirs: bool,
    events: mpsc::Receiver<notify::Event>,
    errors: mpsc::Receiver<notify::Error>,
    watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Create the OS watcher and register `root` and its subdirectories.
    ///
    /// Ignored directories are skipped together with everything below them.
    /// Symlinked directories are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the watcher cannot be created, a directory
    /// cannot be read, or a directory cannot be registered.
    pub fn start(
        root: impl Into<PathBuf>,
        ignore: IgnoreMatcher,
        options: WatchOptions,
    ) -> Result<Self, SetupError> {
        let root = root.into();
        let (event_tx, events) = mpsc::channel(options.channel_capacity);
        let (error_tx, errors) = mpsc::channel(options.channel_capacity);

        // Callback runs on notify's own thread, so blocking_send is allowed
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Send fails only after the receivers are dropped during shutdown
            match res {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(err) => {
                    let _ = error_tx.blocking_send(err);
                }
            }
        })
        .map_err(SetupError::Watcher)?;

        let mut this = Self {
            root,
            ignore,
            watched: BTreeSet::new(),
            rescan_new_dirs: options.rescan_new_dirs,
            events,
            errors,
            watcher,
        };

        let root = this.root.clone();
        this.register_tree(&root)?;
        tracing::info!(
            root = %this.root.display(),
            directories = this.watched.len(),
            ignored = this.ignore.len(),
            "Watching for changes"
        );

        Ok(this)
    }

    /// Watch root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories currently registered with the OS watcher.
    pub fn watched_dirs(&self) -> &BTreeSet<PathBuf> {
        &self.watched
    }

    /// Wait for the next change event or watcher fault.
    ///
    /// Events whose paths are all ignored are skipped. Returns `None` once the
    /// notification backend has shut down. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Result<WatchEvent, WatchError>> {
        loop {
            let raw = tokio::select! {
                Some(event) = self.events.recv() => event,
                Some(err) = self.errors.recv() => return Some(Err(WatchError::Notify(err))),
                else => return None,
            };

            if let Some(event) = self.accept(raw) {
                return Some(Ok(event));
            }
        }
    }

    /// Filter a raw notify event and register new directories if enabled.
    fn accept(&mut self, raw: notify::Event) -> Option<WatchEvent> {
        let kind = watch_event_kind(raw.kind)?;

        if !raw.paths.is_empty() && raw.paths.iter().all(|p| self.ignore.should_ignore(p)) {
            tracing::debug!(paths = ?raw.paths, "Skipping change to ignored path");
            return None;
        }

        if self.rescan_new_dirs && kind == WatchEventKind::Created {
            for path in raw.paths.iter().filter(|p| p.is_dir()) {
                if let Err(err) = self.register_tree(path) {
                    tracing::warn!(error = %WatchError::Rescan(err), "Watcher error");
                }
            }
        }

        Some(WatchEvent {
            paths: raw.paths,
            kind,
        })
    }

    /// Register `dir` and recurse into its subdirectories.
    fn register_tree(&mut self, dir: &Path) -> Result<(), SetupError> {
        if self.ignore.should_ignore(dir) {
            tracing::debug!(path = %dir.display(), "Ignoring directory");
            return Ok(());
        }

        let entries = fs::read_dir(dir).map_err(|source| SetupError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        if !self.watched.contains(dir) {
            self.watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| SetupError::Register {
                    path: dir.to_path_buf(),
                    source,
                })?;
            self.watched.insert(dir.to_path_buf());
            tracing::debug!(path = %dir.display(), "Watching directory");
        }

        for entry in entries {
            let entry = entry.map_err(|source| SetupError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir {
                self.register_tree(&entry.path())?;
            }
        }

        Ok(())
    }
}
