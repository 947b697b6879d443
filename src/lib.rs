//! Container-to-reverse-proxy upstream synchronization.
//!
//! Watches container lifecycle events, resolves the address each declared
//! service's containers can be reached at, and keeps one nginx upstream
//! snippet per service in sync, reloading the proxy when one changes.

// Core subsystems
pub mod config;
pub mod reconciler;
pub mod render;
pub mod routing;
pub mod runtime;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use reconciler::Reconciler;
pub use upstream::UpstreamRegistry;
