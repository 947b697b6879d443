//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty for humans, JSON for log shippers)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (service, container, error) instead of formatted text
//! - Metrics are cheap (atomic increments) and recorded unconditionally;
//!   without an installed exporter they are no-ops

pub mod logging;
pub mod metrics;
