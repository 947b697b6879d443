//! Container runtime subsystem.
//!
//! # Data Flow
//! ```text
//! Container runtime (Docker Engine API)
//!     → docker.rs (filtered event stream, inspect, list)
//!     → ContainerEvent / ContainerInfo (runtime-agnostic)
//!     → reconciler
//! ```
//!
//! # Design Decisions
//! - The reconciler only sees the `ContainerRuntime` trait, so it can be
//!   driven by a scripted runtime in tests
//! - Network and port tables are ordered maps: resolution over them must be
//!   deterministic
//! - Events the reconciler does not act on are dropped at this boundary

pub mod docker;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use docker::DockerRuntime;

/// Errors surfaced by a container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("container {0} not found")]
    NotFound(String),

    #[error("event stream closed")]
    StreamClosed,
}

/// Lifecycle transitions the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Start,
    Stop,
    Die,
    Rename,
}

impl EventAction {
    /// Runtime action names, as used in event filters.
    pub const ALL: [&'static str; 4] = ["start", "stop", "die", "rename"];

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(EventAction::Start),
            "stop" => Some(EventAction::Stop),
            "die" => Some(EventAction::Die),
            "rename" => Some(EventAction::Rename),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Start => "start",
            EventAction::Stop => "stop",
            EventAction::Die => "die",
            EventAction::Rename => "rename",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container-scoped lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub action: EventAction,
    pub container_id: String,
}

impl ContainerEvent {
    pub fn new(action: EventAction, container_id: impl Into<String>) -> Self {
        Self {
            action,
            container_id: container_id.into(),
        }
    }
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortBinding {
    pub host_ip: Option<String>,
    pub host_port: String,
}

/// Point-in-time view of a container's identity and networking.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerInfo {
    pub id: String,

    /// Name as reported by the runtime (Docker prefixes it with "/").
    pub name: String,

    pub running: bool,

    /// Network mode from the container's host config ("host", "bridge", ...).
    pub network_mode: Option<String>,

    /// Attached network name → IP address (may be empty).
    pub networks: BTreeMap<String, String>,

    /// Exposed port key ("9000/tcp") → host bindings (empty when unpublished).
    pub ports: BTreeMap<String, Vec<PortBinding>>,
}

/// Entry from a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub running: bool,
}

/// The container runtime as seen by the reconciler.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Subscribe to start/stop/die/rename events for containers.
    ///
    /// The stream ends or yields an error when the subscription breaks; the
    /// caller is expected to resubscribe.
    fn events(&self) -> BoxStream<'static, Result<ContainerEvent, RuntimeError>>;

    /// Inspect a single container.
    async fn inspect(&self, id: &str) -> Result<ContainerInfo, RuntimeError>;

    /// List all containers, running or not.
    async fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;
}
