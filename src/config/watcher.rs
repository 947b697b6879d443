//! Configuration file poller for hot reload.
//!
//! # Responsibilities
//! - Check the config file's modification time on a fixed interval
//! - Reload, validate and swap the shared config when it moves
//! - Kick off a full rescan after a successful swap
//!
//! # Design Decisions
//! - Timer polling rather than filesystem notifications: bind-mounted
//!   config files inside containers rarely deliver inotify events
//! - The recorded mtime only advances on a successful reload, so a broken
//!   edit is retried (and logged) on every tick until it is fixed

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::loader::{load_config, modified_time};
use crate::observability::metrics;
use crate::reconciler::Reconciler;

/// Result of a single poll.
#[derive(Debug)]
pub enum PollOutcome {
    /// mtime unchanged (or the file could not be stat'ed).
    Unchanged,
    /// New config swapped in; the handle tracks the triggered rescan.
    Reloaded { rescan: JoinHandle<()> },
    /// The file changed but failed to load; the previous config stays.
    Rejected,
}

/// True when `current` is known and differs from `last`.
pub fn has_changed(last: Option<SystemTime>, current: Option<SystemTime>) -> bool {
    match current {
        Some(current) => last != Some(current),
        None => false,
    }
}

/// Watches one config file by polling its mtime.
pub struct ConfigPoller {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    reconciler: Arc<Reconciler>,
}

impl ConfigPoller {
    /// `last_modified` is the mtime observed when the active config was loaded.
    pub fn new(
        path: &Path,
        last_modified: Option<SystemTime>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            last_modified,
            reconciler,
        }
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Check the file once and reload it if it changed.
    pub fn poll_once(&mut self) -> PollOutcome {
        let current = modified_time(&self.path);
        if !has_changed(self.last_modified, current) {
            return PollOutcome::Unchanged;
        }

        tracing::info!(path = %self.path.display(), "Config file change detected, reloading...");
        match load_config(&self.path) {
            Ok(config) => {
                tracing::info!(
                    services = config.services.len(),
                    "Configuration reloaded, rescanning containers"
                );
                self.last_modified = current;
                self.reconciler.replace_config(config);
                metrics::record_config_reload(true);
                PollOutcome::Reloaded {
                    rescan: self.reconciler.spawn_rescan(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to reload config: {}. Keeping current configuration.",
                    e
                );
                metrics::record_config_reload(false);
                PollOutcome::Rejected
            }
        }
    }

    /// Poll until shutdown. The interval is re-read from the active config
    /// after every tick, so a reload can change it.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(path = %self.path.display(), "Config poller started");

        loop {
            let interval = self.interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.poll_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Config poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.reconciler.config().global.poll_interval_secs.max(1))
    }
}
