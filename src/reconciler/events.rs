//! Container event loop.
//!
//! # Responsibilities
//! - Subscribe to the runtime's event stream
//! - Dispatch each event to the reconciler, one at a time
//! - Resubscribe after a fixed delay when the stream breaks
//!
//! # Design Decisions
//! - Events are handled sequentially in arrival order; per-container
//!   failures are logged and the loop moves on
//! - Shutdown is observed both while waiting for events and while waiting
//!   to resubscribe

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::reconciler::{Outcome, Reconciler};
use crate::runtime::{ContainerEvent, RuntimeError};

/// Long-running consumer of container lifecycle events.
pub struct EventWatcher {
    reconciler: Arc<Reconciler>,
}

impl EventWatcher {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Consume events until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let mut events = self.reconciler.runtime().events();
            tracing::info!("Subscribed to container events");

            let reason = loop {
                tokio::select! {
                    next = events.next() => match next {
                        Some(Ok(event)) => self.dispatch(&event).await,
                        Some(Err(e)) => break e,
                        None => break RuntimeError::StreamClosed,
                    },
                    _ = shutdown.recv() => {
                        tracing::info!("Event watcher received shutdown signal, exiting loop");
                        return;
                    }
                }
            };

            let delay = self.retry_delay();
            tracing::warn!(
                error = %reason,
                retry_in_secs = delay.as_secs(),
                "Container event stream interrupted"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Event watcher received shutdown signal, exiting loop");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, event: &ContainerEvent) {
        metrics::record_event(event.action.as_str());
        tracing::debug!(action = %event.action, container = %event.container_id, "Container event");

        match self.reconciler.handle_event(event).await {
            Ok(Outcome::Ignored) | Ok(Outcome::Unchanged { .. }) => {}
            Ok(outcome) => tracing::debug!(?outcome, "Event applied"),
            Err(e) if e.is_filesystem() => tracing::error!(
                action = %event.action,
                container = %event.container_id,
                error = %e,
                "Failed to apply container event"
            ),
            Err(e) => tracing::warn!(
                action = %event.action,
                container = %event.container_id,
                error = %e,
                "Failed to handle container event"
            ),
        }
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.reconciler.config().global.event_retry_secs)
    }
}
