//! Upstream state subsystem.
//!
//! # Data Flow
//! ```text
//! Reconciler decision (service target + member)
//!     → registry.rs (lock, mutate member set)
//!     → member.rs (address-keyed dedup)
//!     → render (pure text) → write / delete <dir>/<service>.conf
//!     → reload.rs (run the proxy reload command)
//! ```
//!
//! # Design Decisions
//! - The registry is only touched through upsert / remove / materialize
//! - File absence is the canonical "no members" state
//! - Reload runs outside the registry lock, from the mutating task

pub mod member;
pub mod registry;
pub mod reload;
pub mod target;

pub use member::{MemberSet, UpstreamMember};
pub use registry::{Materialized, Mutation, RegistryError, UpstreamRegistry};
pub use reload::{ReloadCommand, ReloadError};
pub use target::ServiceTarget;
