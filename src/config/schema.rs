//! Configuration schema definitions.
//!
//! This module defines the declared configuration: global proxy settings plus
//! the ordered list of services to keep in sync. All types derive Serde traits
//! for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root of the declared configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Proxy-wide settings.
    pub global: GlobalConfig,

    /// Service definitions, matched against containers by name.
    pub services: Vec<ServiceConfig>,
}

impl AppConfig {
    /// Look up a service by its declared name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Global settings shared by every service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Directory receiving one `<service>.conf` per http service.
    pub nginx_config_dir: String,

    /// Directory receiving one `<service>.conf` per stream service.
    pub stream_config_dir: String,

    /// Command run after every on-disk change (e.g. "nginx -s reload").
    pub nginx_reload_cmd: String,

    /// Proxy behavior for services without their own `proxy_config`.
    pub default_proxy: ProxyOptions,

    /// Address of the docker host, used for host and bridge networking.
    pub host_ip: Option<String>,

    /// TLS certificate path (PEM).
    #[serde(rename = "ssl_certificate")]
    pub ssl_cert_path: Option<String>,

    /// TLS private key path (PEM).
    #[serde(rename = "ssl_certificate_key")]
    pub ssl_key_path: Option<String>,

    /// Redirect plain HTTP to HTTPS when TLS is configured.
    pub force_https: bool,

    /// Seconds between config file modification checks.
    pub poll_interval_secs: u64,

    /// Seconds to wait before resubscribing to a broken event stream.
    pub event_retry_secs: u64,

    /// Seconds to wait before the startup rescan.
    pub rescan_delay_secs: u64,

    /// Template file replacing the built-in http layout.
    pub http_template_file: Option<String>,

    /// Template file replacing the built-in stream layout.
    pub stream_template_file: Option<String>,

    /// Template file for stream services with SNI routing.
    pub stream_sni_template_file: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            nginx_config_dir: String::new(),
            stream_config_dir: String::new(),
            nginx_reload_cmd: String::new(),
            default_proxy: ProxyOptions::default(),
            host_ip: None,
            ssl_cert_path: None,
            ssl_key_path: None,
            force_https: false,
            poll_interval_secs: 5,
            event_retry_secs: 5,
            rescan_delay_secs: 2,
            http_template_file: None,
            stream_template_file: None,
            stream_sni_template_file: None,
        }
    }
}

impl GlobalConfig {
    /// Host IP, treating an empty string as unset.
    pub fn host_ip(&self) -> Option<&str> {
        self.host_ip.as_deref().filter(|ip| !ip.is_empty())
    }

    /// Certificate and key paths, present only when both are configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (self.ssl_cert_path.as_deref(), self.ssl_key_path.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }

    /// Operator template for a service of `kind`, `None` for the built-in
    /// layout. Empty paths count as unset.
    pub fn template_file(&self, kind: ServiceKind, sni: bool) -> Option<&str> {
        let path = match (kind, sni) {
            (ServiceKind::Http, _) => &self.http_template_file,
            (ServiceKind::Stream, false) => &self.stream_template_file,
            (ServiceKind::Stream, true) => &self.stream_sni_template_file,
        };
        path.as_deref().filter(|p| !p.is_empty())
    }
}

/// Per-location proxy behavior.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyOptions {
    /// Emit Upgrade/Connection headers for WebSocket traffic.
    pub enable_websocket: bool,

    /// Value for `client_max_body_size` (e.g. "10m").
    pub client_max_body_size: Option<String>,

    /// Value for `proxy_http_version` (e.g. "1.1").
    pub proxy_http_version: Option<String>,

    /// Raw `proxy_set_header` arguments (e.g. "X-Real-IP $remote_addr").
    pub proxy_headers: Vec<String>,

    /// Value for `proxy_redirect` (e.g. "off").
    pub proxy_redirect: Option<String>,
}

/// Kind of proxying performed for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Layer 7, rendered into the http config directory.
    Http,
    /// Layer 4, rendered into the stream config directory.
    Stream,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Http => "http",
            ServiceKind::Stream => "stream",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ServiceKind::Http),
            "stream" => Ok(ServiceKind::Stream),
            other => Err(other.to_string()),
        }
    }
}

/// A declared service: one matched container behind one proxy entry.
///
/// `kind` is kept as raw text so that a single bad entry is rejected by
/// per-service validation instead of failing the whole document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Unique service identifier, also the artifact file stem.
    pub name: String,

    /// "http" or "stream".
    #[serde(rename = "type")]
    pub kind: String,

    /// Container name to match (a leading "/" is ignored).
    pub container_name: String,

    /// Server name for http services.
    pub domain: Option<String>,

    /// Location prefix for http services (default "/").
    pub path: Option<String>,

    /// Container port for http services.
    pub port: Option<u16>,

    /// Proxy listen port for stream services.
    pub listen_port: Option<u16>,

    /// Container port for stream services.
    pub container_port: Option<u16>,

    /// Name of the generated `upstream` block.
    pub upstream_name: String,

    /// Override for `global.default_proxy`.
    pub proxy_config: Option<ProxyOptions>,

    /// Route stream connections by TLS server name.
    pub enable_sni: bool,

    /// SNI domain → upstream name.
    pub domain_routes: BTreeMap<String, String>,

    /// Upstream used when no SNI domain matches (default: `upstream_name`).
    pub default_route: Option<String>,

    /// Upstreams with fixed members, referenced from `domain_routes`.
    pub static_upstreams: BTreeMap<String, Vec<String>>,
}

impl ServiceConfig {
    /// Parsed service kind, `None` when unrecognized.
    pub fn service_kind(&self) -> Option<ServiceKind> {
        self.kind.parse().ok()
    }

    /// Port the service listens on inside the container.
    pub fn target_port(&self) -> Option<u16> {
        match self.service_kind()? {
            ServiceKind::Http => self.port,
            ServiceKind::Stream => self.container_port,
        }
    }

    /// Effective proxy options, falling back to the global default.
    pub fn proxy_options<'a>(&'a self, global: &'a GlobalConfig) -> &'a ProxyOptions {
        self.proxy_config.as_ref().unwrap_or(&global.default_proxy)
    }
}
