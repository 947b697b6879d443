//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Registry + Reconciler
//!     → Event watcher + Config poller → Delayed initial rescan
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Loops exit → Tasks joined
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then background loops
//! - Background loops stop at their next await point; work already
//!   handed to a rescan task runs to completion

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, Running};
