//! Routing subsystem: which service a container backs, and where to reach it.
//!
//! # Data Flow
//! ```text
//! ContainerInfo (name, networks, ports)
//!     → matcher.rs (container name → declared service)
//!     → resolver.rs (network metadata + target port → reachable ip:port)
//!     → Return: UpstreamMember or explicit failure
//! ```
//!
//! # Design Decisions
//! - Both steps are pure functions over their inputs
//! - Deterministic: same input always yields the same match and address
//! - No partial results: resolution either yields ip and port, or an error
//! - "No matching service" is not an error; the container is simply not ours

pub mod matcher;
pub mod resolver;

pub use matcher::find_service;
pub use resolver::{resolve_address, ResolveError};
