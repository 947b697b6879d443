//! Service matching by container name.
//!
//! # Responsibilities
//! - Normalize runtime-reported names (Docker prefixes them with "/")
//! - Find the declared service claiming that container
//!
//! # Design Decisions
//! - Matching is exact and case-sensitive, like container names themselves
//! - Declared names are normalized too, so "/db" and "db" are equivalent
//! - Uniqueness of container names is enforced at config load, not here

use crate::config::ServiceConfig;

/// Strip the leading "/" the runtime may prepend to container names.
pub fn normalize_container_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Return the service whose `container_name` matches `container_name`.
pub fn find_service<'a>(
    container_name: &str,
    services: &'a [ServiceConfig],
) -> Option<&'a ServiceConfig> {
    let wanted = normalize_container_name(container_name);
    if wanted.is_empty() {
        return None;
    }
    services
        .iter()
        .find(|service| normalize_container_name(&service.container_name) == wanted)
}
