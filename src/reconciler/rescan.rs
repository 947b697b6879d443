//! Full rescan of running containers.
//!
//! # Responsibilities
//! - List every container and reconcile the running ones concurrently
//! - Isolate failures (including panics) to the container that caused them
//! - Summarize the pass for logs and metrics

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};

use crate::observability::metrics;
use crate::reconciler::{Outcome, ReconcileError, Reconciler};

/// Summary of one rescan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Running containers that were handled.
    pub scanned: usize,
    /// Containers registered with a service.
    pub registered: usize,
    /// Containers no service claims, or that stopped while being registered.
    pub ignored: usize,
    /// Containers whose handling failed or panicked.
    pub failed: usize,
}

impl Reconciler {
    /// Reconcile every running container against the active config.
    ///
    /// Only listing can fail the pass as a whole.
    pub async fn rescan(self: &Arc<Self>) -> Result<RescanReport, ReconcileError> {
        let containers = self.runtime().list().await.map_err(ReconcileError::List)?;

        let mut units = JoinSet::new();
        for container in containers.into_iter().filter(|c| c.running) {
            let reconciler = Arc::clone(self);
            units.spawn(async move {
                let result = reconciler.apply_start(&container.id).await;
                (container.id, result)
            });
        }

        let mut report = RescanReport {
            scanned: units.len(),
            ..Default::default()
        };
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((_, Ok(Outcome::Registered { .. }))) => report.registered += 1,
                Ok((_, Ok(_))) => report.ignored += 1,
                Ok((container, Err(e))) if e.is_filesystem() => {
                    tracing::error!(container = %container, error = %e, "Rescan failed for container");
                    report.failed += 1;
                }
                Ok((container, Err(e))) => {
                    tracing::warn!(container = %container, error = %e, "Rescan failed for container");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Rescan task panicked");
                    report.failed += 1;
                }
            }
        }

        metrics::record_rescan(report.failed);
        tracing::info!(
            scanned = report.scanned,
            registered = report.registered,
            ignored = report.ignored,
            failed = report.failed,
            "Rescan complete"
        );
        Ok(report)
    }

    /// Run [`Reconciler::rescan`] in the background, logging a failed listing.
    pub fn spawn_rescan(self: &Arc<Self>) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = reconciler.rescan().await {
                tracing::warn!(error = %e, "Rescan aborted");
            }
        })
    }
}
