//! Reconciliation of container lifecycle events into upstream state.
//!
//! # Data Flow
//! ```text
//! Container event (events.rs)          Rescan (rescan.rs)
//!     start / rename                       list running containers
//!     stop / die                           → one task per container
//!         │                                      │
//!         └──────────────┬───────────────────────┘
//!                        ▼
//!     inspect → match service (routing::matcher)
//!             → validate → ServiceTarget
//!             → resolve address (routing::resolver)
//!             → registry upsert/remove + materialize
//!             → proxy reload when disk state changed
//! ```
//!
//! # Design Decisions
//! - The active config is read once per operation from an `ArcSwap`, so an
//!   operation never sees half of an old config and half of a new one
//! - The service and address each container was registered under are
//!   remembered, since a stopped container no longer reports its published
//!   ports and a reload may have dropped its service
//! - Every handled stop bumps a per-container generation; a start commits
//!   its member under the registry lock only if no stop was handled since it
//!   began, so a slow inspect cannot resurrect a stopped container
//! - Failures are scoped to the container being handled and never stop the
//!   event loop or a rescan

pub mod events;
pub mod rescan;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::loader::join_errors;
use crate::config::validation::ValidationError;
use crate::config::{AppConfig, ServiceConfig};
use crate::routing::{find_service, resolve_address, ResolveError};
use crate::runtime::{ContainerEvent, ContainerInfo, ContainerRuntime, EventAction, RuntimeError};
use crate::upstream::{
    Mutation, RegistryError, ReloadCommand, ReloadError, ServiceTarget, UpstreamMember,
    UpstreamRegistry,
};

pub use events::EventWatcher;
pub use rescan::RescanReport;

/// Failures while reconciling a single container.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to inspect container {container}: {source}")]
    Inspect {
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to list containers: {0}")]
    List(#[source] RuntimeError),

    #[error("service '{service}' is misconfigured: {}", join_errors(.errors))]
    InvalidService {
        service: String,
        errors: Vec<ValidationError>,
    },

    #[error("cannot resolve an address for service '{service}': {source}")]
    Unresolvable {
        service: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("proxy reload failed: {0}")]
    Reload(#[from] ReloadError),
}

impl ReconcileError {
    /// Writing or deleting an artifact failed.
    pub fn is_filesystem(&self) -> bool {
        matches!(self, ReconcileError::Registry(_))
    }
}

/// What handling one container did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No declared service claims the container.
    Ignored,
    /// The container's address is now a member of `service`.
    Registered {
        service: String,
        member: UpstreamMember,
        reloaded: bool,
    },
    /// The member at `address` left `service`.
    Removed {
        service: String,
        address: String,
        reloaded: bool,
    },
    /// The event concerned `service` but changed nothing.
    Unchanged { service: String },
    /// The container was stopped before its registration could be applied.
    Stale { service: String },
}

#[derive(Debug, Clone)]
struct KnownMember {
    service: String,
    address: String,
}

#[derive(Debug, Default)]
struct ContainerState {
    pending_starts: usize,
    /// Bumped by every handled stop.
    stop_gen: u64,
    member: Option<KnownMember>,
}

/// Applies container lifecycle changes to the upstream registry.
pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    config: ArcSwap<AppConfig>,
    registry: Arc<UpstreamRegistry>,
    /// container id → in-flight starts and where it was last registered
    containers: Mutex<HashMap<String, ContainerState>>,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: AppConfig,
        registry: Arc<UpstreamRegistry>,
    ) -> Self {
        Self {
            runtime,
            config: ArcSwap::from_pointee(config),
            registry,
            containers: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    /// Atomically replace the active configuration.
    pub fn replace_config(&self, config: AppConfig) {
        self.config.store(Arc::new(config));
    }

    /// Route one event to the matching handler.
    pub async fn handle_event(&self, event: &ContainerEvent) -> Result<Outcome, ReconcileError> {
        match event.action {
            EventAction::Start | EventAction::Rename => self.apply_start(&event.container_id).await,
            EventAction::Stop | EventAction::Die => self.apply_stop(&event.container_id).await,
        }
    }

    /// Register a (running) container with its service.
    ///
    /// A stop handled for the same container while this call was inspecting
    /// or resolving wins: the member is discarded with [`Outcome::Stale`].
    pub async fn apply_start(&self, container_id: &str) -> Result<Outcome, ReconcileError> {
        let guard = self.begin_start(container_id);
        let info = self.inspect(container_id).await?;
        let config = self.config();

        let Some(service) = find_service(&info.name, &config.services) else {
            tracing::debug!(container = %info.name, "No service claims container, ignoring");
            return Ok(Outcome::Ignored);
        };
        let target = target_for(service, &config)?;

        let member = resolve_address(&info, target.target_port, config.global.host_ip())
            .map_err(|source| ReconcileError::Unresolvable {
                service: service.name.clone(),
                source,
            })?;

        let committed = self
            .registry
            .upsert_if(&target, member.clone(), || {
                guard.commit(&service.name, &member.address)
            })
            .await?;
        let Some(mutation) = committed else {
            tracing::debug!(
                service = %service.name,
                container = %info.name,
                "Container stopped while registering, discarding"
            );
            return Ok(Outcome::Stale {
                service: service.name.clone(),
            });
        };
        tracing::info!(
            service = %service.name,
            container = %info.name,
            member = %member,
            "Registered container"
        );

        let reloaded = self.reload_if_needed(&config, &mutation).await?;
        Ok(Outcome::Registered {
            service: service.name.clone(),
            member,
            reloaded,
        })
    }

    /// Remove a stopped container from its service.
    ///
    /// A container this process registered is removed from the service and
    /// address it was registered under, even when a reload has since dropped
    /// that service. Otherwise the address is resolved from the container's
    /// current state.
    pub async fn apply_stop(&self, container_id: &str) -> Result<Outcome, ReconcileError> {
        let config = self.config();
        match self.begin_stop(container_id) {
            Some(known) => self.remove_known(&config, known).await,
            None => self.remove_inspected(&config, container_id).await,
        }
    }

    async fn remove_known(
        &self,
        config: &AppConfig,
        known: KnownMember,
    ) -> Result<Outcome, ReconcileError> {
        let declared = config
            .service(&known.service)
            .and_then(|service| target_for(service, config).ok());
        let mutation = match declared {
            Some(target) => Some(self.registry.remove(&target, &known.address).await?),
            None => {
                tracing::debug!(
                    service = %known.service,
                    "Service no longer declared, removing with last rendered settings"
                );
                self.registry
                    .remove_undeclared(&known.service, &known.address)
                    .await?
            }
        };
        self.finish_remove(config, known.service, known.address, mutation)
            .await
    }

    async fn remove_inspected(
        &self,
        config: &AppConfig,
        container_id: &str,
    ) -> Result<Outcome, ReconcileError> {
        let info = self.inspect(container_id).await?;
        let Some(service) = find_service(&info.name, &config.services) else {
            tracing::debug!(container = %info.name, "No service claims container, ignoring");
            return Ok(Outcome::Ignored);
        };
        let target = target_for(service, config)?;

        let member = match resolve_address(&info, target.target_port, config.global.host_ip()) {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(
                    service = %service.name,
                    container = %info.name,
                    reason = %e,
                    "No address to remove"
                );
                return Ok(Outcome::Unchanged {
                    service: service.name.clone(),
                });
            }
        };

        let mutation = self.registry.remove(&target, &member.address).await?;
        self.finish_remove(config, service.name.clone(), member.address, Some(mutation))
            .await
    }

    async fn finish_remove(
        &self,
        config: &AppConfig,
        service: String,
        address: String,
        mutation: Option<Mutation>,
    ) -> Result<Outcome, ReconcileError> {
        let Some(mutation) = mutation.filter(|m| m.changed) else {
            return Ok(Outcome::Unchanged { service });
        };
        tracing::info!(service = %service, address = %address, "Deregistered container");

        let reloaded = self.reload_if_needed(config, &mutation).await?;
        Ok(Outcome::Removed {
            service,
            address,
            reloaded,
        })
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, ReconcileError> {
        self.runtime
            .inspect(container_id)
            .await
            .map_err(|source| ReconcileError::Inspect {
                container: container_id.to_string(),
                source,
            })
    }

    async fn reload_if_needed(
        &self,
        config: &AppConfig,
        mutation: &Mutation,
    ) -> Result<bool, ReconcileError> {
        if !mutation.materialized.changed_disk() {
            return Ok(false);
        }
        let command = ReloadCommand::parse(&config.global.nginx_reload_cmd)?;
        let output = command.run().await?;
        tracing::info!(output = %output, "Proxy reloaded");
        Ok(true)
    }

    fn containers(&self) -> MutexGuard<'_, HashMap<String, ContainerState>> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_start<'a>(&'a self, container_id: &'a str) -> StartGuard<'a> {
        let mut containers = self.containers();
        let state = containers.entry(container_id.to_string()).or_default();
        state.pending_starts += 1;
        StartGuard {
            reconciler: self,
            container_id,
            stop_gen: state.stop_gen,
        }
    }

    /// Invalidate in-flight starts and take the registered member, if any.
    fn begin_stop(&self, container_id: &str) -> Option<KnownMember> {
        let mut containers = self.containers();
        let state = containers.get_mut(container_id)?;
        state.stop_gen += 1;
        let member = state.member.take();
        if state.pending_starts == 0 {
            containers.remove(container_id);
        }
        member
    }
}

/// Tracks one in-flight `apply_start`.
struct StartGuard<'a> {
    reconciler: &'a Reconciler,
    container_id: &'a str,
    stop_gen: u64,
}

impl StartGuard<'_> {
    /// Record the member unless a stop was handled since the start began.
    /// Runs under the registry lock.
    fn commit(&self, service: &str, address: &str) -> bool {
        let mut containers = self.reconciler.containers();
        let Some(state) = containers.get_mut(self.container_id) else {
            return false;
        };
        if state.stop_gen != self.stop_gen {
            return false;
        }
        state.member = Some(KnownMember {
            service: service.to_string(),
            address: address.to_string(),
        });
        true
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        let mut containers = self.reconciler.containers();
        if let Some(state) = containers.get_mut(self.container_id) {
            state.pending_starts = state.pending_starts.saturating_sub(1);
            if state.pending_starts == 0 && state.member.is_none() {
                containers.remove(self.container_id);
            }
        }
    }
}

fn target_for(service: &ServiceConfig, config: &AppConfig) -> Result<ServiceTarget, ReconcileError> {
    ServiceTarget::from_config(service, &config.global).map_err(|errors| {
        ReconcileError::InvalidService {
            service: service.name.clone(),
            errors,
        }
    })
}
