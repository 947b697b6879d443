//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated configuration together with the source's modification time
/// observed before it was read.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub modified: Option<SystemTime>,
}

/// Load and validate configuration from a YAML (or `.toml`) file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(path, &content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load the file and record its modification time.
///
/// The timestamp is taken before reading so that an edit racing the read is
/// seen as a change on the next poll rather than lost.
pub fn load_with_mtime(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let modified = modified_time(path);
    let config = load_config(path)?;
    Ok(LoadedConfig { config, modified })
}

/// Current modification time of `path`, `None` if it cannot be read.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn parse_config(path: &Path, content: &str) -> Result<AppConfig, ConfigError> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        Ok(toml::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
global:
  nginx_config_dir: /etc/nginx/conf.d
  stream_config_dir: /etc/nginx/stream.d
  nginx_reload_cmd: nginx -s reload
  host_ip: 192.168.1.10
  default_proxy:
    client_max_body_size: 10m
services:
  - name: api
    type: http
    container_name: my-api
    domain: api.example.com
    port: 9000
    upstream_name: api_backend
  - name: tls
    type: stream
    container_name: gateway
    listen_port: 443
    container_port: 8443
    upstream_name: tls_backend
    enable_sni: true
    domain_routes:
      a.example.com: a_pool
    static_upstreams:
      a_pool: ["10.0.0.1:443"]
"#;

    fn write_temp(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_yaml() {
        let (_dir, path) = write_temp("config.yaml", YAML);
        let config = load_config(&path).unwrap();

        assert_eq!(config.global.host_ip(), Some("192.168.1.10"));
        assert_eq!(config.global.poll_interval_secs, 5);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].port, Some(9000));
        assert_eq!(
            config.services[1].static_upstreams["a_pool"],
            vec!["10.0.0.1:443".to_string()]
        );
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[global]
nginx_config_dir = "/etc/nginx/conf.d"
stream_config_dir = "/etc/nginx/stream.d"
nginx_reload_cmd = "nginx -s reload"

[[services]]
name = "api"
type = "http"
container_name = "my-api"
domain = "api.example.com"
port = 9000
upstream_name = "api_backend"
"#;
        let (_dir, path) = write_temp("config.toml", toml);
        let config = load_config(&path).unwrap();
        assert_eq!(config.services[0].upstream_name, "api_backend");
    }

    #[test]
    fn test_malformed_yaml_is_rejected() {
        let (_dir, path) = write_temp("config.yaml", "global: [unclosed");
        assert!(matches!(load_config(&path), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_invalid_global_is_rejected() {
        let (_dir, path) = write_temp("config.yaml", "global:\n  nginx_config_dir: /tmp\n");
        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/definitely/not/here.yaml");
        assert!(matches!(load_config(path), Err(ConfigError::Io(_))));
        assert!(modified_time(path).is_none());
    }

    #[test]
    fn test_load_with_mtime() {
        let (_dir, path) = write_temp("config.yaml", YAML);
        let loaded = load_with_mtime(&path).unwrap();
        assert_eq!(loaded.modified, modified_time(&path));
    }
}
