//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry and reconciler from a validated config
//! - Start the event watcher and the config poller
//! - Schedule the initial rescan after a short settle delay
//!
//! # Design Decisions
//! - Fail fast: config loading and runtime connection happen before this
//!   point, in `main`, and are fatal there
//! - The initial rescan waits `rescan_delay_secs` so the event subscription
//!   is already live and no container started meanwhile is missed

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::loader::LoadedConfig;
use crate::config::watcher::ConfigPoller;
use crate::lifecycle::Shutdown;
use crate::reconciler::{EventWatcher, Reconciler};
use crate::render::TemplateRenderer;
use crate::runtime::ContainerRuntime;
use crate::upstream::UpstreamRegistry;

/// Handles to the background tasks of a started service.
pub struct Running {
    pub reconciler: Arc<Reconciler>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Running {
    /// Wait for every background task to finish (after shutdown was triggered).
    pub async fn join(self) {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(task = name, error = %e, "Background task failed");
            }
        }
    }
}

/// Start all background work for `loaded`, read from `config_path`.
pub fn start(
    config_path: &Path,
    loaded: LoadedConfig,
    runtime: Arc<dyn ContainerRuntime>,
    shutdown: &Shutdown,
) -> Running {
    let LoadedConfig { config, modified } = loaded;
    let rescan_delay = Duration::from_secs(config.global.rescan_delay_secs);

    let registry = Arc::new(UpstreamRegistry::new(Arc::new(TemplateRenderer::new())));
    let reconciler = Arc::new(Reconciler::new(runtime, config, registry));

    let watcher = EventWatcher::new(Arc::clone(&reconciler));
    let poller = ConfigPoller::new(config_path, modified, Arc::clone(&reconciler));

    let tasks = vec![
        ("event-watcher", tokio::spawn(watcher.run(shutdown.subscribe()))),
        ("config-poller", tokio::spawn(poller.run(shutdown.subscribe()))),
        (
            "initial-rescan",
            tokio::spawn(initial_rescan(
                Arc::clone(&reconciler),
                rescan_delay,
                shutdown.subscribe(),
            )),
        ),
    ];

    tracing::info!(rescan_delay_secs = rescan_delay.as_secs(), "Background tasks started");
    Running { reconciler, tasks }
}

async fn initial_rescan(
    reconciler: Arc<Reconciler>,
    delay: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            if let Err(e) = reconciler.rescan().await {
                tracing::warn!(error = %e, "Initial rescan failed");
            }
        }
        _ = shutdown.recv() => {
            tracing::info!("Shutdown before initial rescan, skipping");
        }
    }
}
