//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML, or TOML by extension)
//!     → loader.rs (parse & deserialize, capture mtime)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via ArcSwap to the reconciler
//!
//! Every poll interval:
//!     watcher.rs compares the file's mtime
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<AppConfig>
//!     → full rescan of running containers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - A rejected reload keeps the previous config in force
//! - Validation separates syntactic (serde) from semantic checks
//! - Per-service checks are repeated at event time so one broken service
//!   never blocks the others

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AppConfig;
pub use schema::GlobalConfig;
pub use schema::ProxyOptions;
pub use schema::ServiceConfig;
pub use schema::ServiceKind;
