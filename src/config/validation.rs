//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Global section: required directories and reload command
//! - Cross-service integrity: unique names and container names
//! - Per-service checks, applied at runtime before a service is used
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: AppConfig → Result<(), Vec<ValidationError>>
//! - Per-service errors discard only that service, never the document

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{AppConfig, ServiceConfig, ServiceKind};

/// A single semantic problem in the declared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("global.{0} must not be empty")]
    MissingGlobal(&'static str),

    #[error("global.{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("service has an empty name")]
    MissingName,

    #[error("service '{service}': {field} must not be empty")]
    MissingField { service: String, field: &'static str },

    #[error("service '{service}': type must be http or stream, got '{kind}'")]
    UnknownKind { service: String, kind: String },

    #[error("service name '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("container_name '{container}' is claimed by both '{first}' and '{second}'")]
    DuplicateContainer {
        container: String,
        first: String,
        second: String,
    },
}

/// Validate the document as loaded: global settings and service uniqueness.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let global = &config.global;

    if global.nginx_config_dir.trim().is_empty() {
        errors.push(ValidationError::MissingGlobal("nginx_config_dir"));
    }
    if global.stream_config_dir.trim().is_empty() {
        errors.push(ValidationError::MissingGlobal("stream_config_dir"));
    }
    if global.nginx_reload_cmd.trim().is_empty() {
        errors.push(ValidationError::MissingGlobal("nginx_reload_cmd"));
    }
    if global.poll_interval_secs == 0 {
        errors.push(ValidationError::ZeroInterval("poll_interval_secs"));
    }
    if global.event_retry_secs == 0 {
        errors.push(ValidationError::ZeroInterval("event_retry_secs"));
    }

    let mut names = HashSet::new();
    let mut containers: Vec<(String, &str)> = Vec::new();
    for service in &config.services {
        if !service.name.is_empty() && !names.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateName(service.name.clone()));
        }

        let container = service.container_name.trim_start_matches('/');
        if container.is_empty() {
            continue;
        }
        if let Some((_, first)) = containers.iter().find(|(c, _)| c == container) {
            errors.push(ValidationError::DuplicateContainer {
                container: container.to_string(),
                first: first.to_string(),
                second: service.name.clone(),
            });
        } else {
            containers.push((container.to_string(), service.name.as_str()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one service's type-specific required fields.
pub fn validate_service(service: &ServiceConfig) -> Result<ServiceKind, Vec<ValidationError>> {
    if service.name.is_empty() {
        return Err(vec![ValidationError::MissingName]);
    }

    let mut errors = Vec::new();
    let missing = |field| ValidationError::MissingField {
        service: service.name.clone(),
        field,
    };

    if service.container_name.trim_start_matches('/').is_empty() {
        errors.push(missing("container_name"));
    }
    if service.upstream_name.is_empty() {
        errors.push(missing("upstream_name"));
    }

    let kind = service.service_kind();
    match kind {
        Some(ServiceKind::Http) => {
            if service.domain.as_deref().unwrap_or_default().is_empty() {
                errors.push(missing("domain"));
            }
            if service.port.unwrap_or(0) == 0 {
                errors.push(missing("port"));
            }
        }
        Some(ServiceKind::Stream) => {
            if service.listen_port.unwrap_or(0) == 0 {
                errors.push(missing("listen_port"));
            }
            if service.container_port.unwrap_or(0) == 0 {
                errors.push(missing("container_port"));
            }
            if service.enable_sni && service.domain_routes.is_empty() {
                errors.push(missing("domain_routes"));
            }
        }
        None => errors.push(ValidationError::UnknownKind {
            service: service.name.clone(),
            kind: service.kind.clone(),
        }),
    }

    match kind {
        Some(kind) if errors.is_empty() => Ok(kind),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GlobalConfig;

    fn global() -> GlobalConfig {
        GlobalConfig {
            nginx_config_dir: "/etc/nginx/conf.d".into(),
            stream_config_dir: "/etc/nginx/stream.d".into(),
            nginx_reload_cmd: "nginx -s reload".into(),
            ..Default::default()
        }
    }

    fn http_service(name: &str, container: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            kind: "http".into(),
            container_name: container.into(),
            domain: Some(format!("{name}.example.com")),
            port: Some(8080),
            upstream_name: format!("{name}_backend"),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = AppConfig {
            global: global(),
            services: vec![http_service("api", "my-api"), http_service("web", "my-web")],
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_globals_reported_together() {
        let config = AppConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingGlobal("nginx_config_dir"),
                ValidationError::MissingGlobal("stream_config_dir"),
                ValidationError::MissingGlobal("nginx_reload_cmd"),
            ]
        );
    }

    #[test]
    fn test_duplicate_container_name() {
        let config = AppConfig {
            global: global(),
            services: vec![http_service("api", "/shared"), http_service("web", "shared")],
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateContainer {
                container: "shared".into(),
                first: "api".into(),
                second: "web".into(),
            }]
        );
    }

    #[test]
    fn test_duplicate_service_name() {
        let config = AppConfig {
            global: global(),
            services: vec![http_service("api", "a"), http_service("api", "b")],
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateName("api".into())]);
    }

    #[test]
    fn test_invalid_service_does_not_fail_document() {
        let mut broken = http_service("broken", "b");
        broken.kind = "grpc".into();
        let config = AppConfig {
            global: global(),
            services: vec![broken.clone()],
        };
        assert!(validate_config(&config).is_ok());
        assert_eq!(
            validate_service(&broken).unwrap_err(),
            vec![ValidationError::UnknownKind {
                service: "broken".into(),
                kind: "grpc".into(),
            }]
        );
    }

    #[test]
    fn test_http_service_requirements() {
        let mut service = http_service("api", "my-api");
        assert_eq!(validate_service(&service), Ok(ServiceKind::Http));

        service.domain = None;
        service.port = Some(0);
        let errors = validate_service(&service).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_stream_service_requirements() {
        let mut service = ServiceConfig {
            name: "db".into(),
            kind: "stream".into(),
            container_name: "postgres".into(),
            listen_port: Some(5432),
            container_port: Some(5432),
            upstream_name: "db_backend".into(),
            ..Default::default()
        };
        assert_eq!(validate_service(&service), Ok(ServiceKind::Stream));

        service.enable_sni = true;
        let errors = validate_service(&service).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingField {
                service: "db".into(),
                field: "domain_routes",
            }]
        );
    }
}
