//! Per-service materialization target.

use std::path::{Path, PathBuf};

use crate::config::validation::{validate_service, ValidationError};
use crate::config::{GlobalConfig, ServiceConfig, ServiceKind};
use crate::render::{HttpParams, RenderParams, SniParams, StreamParams, TlsParams};

/// Where and how a service's configuration artifact is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub service_name: String,
    pub kind: ServiceKind,
    /// Port the service listens on inside the container.
    pub target_port: u16,
    /// `<config_dir>/<service_name>.conf`
    pub artifact_path: PathBuf,
    /// Operator template, `None` for the built-in layout.
    pub template: Option<PathBuf>,
    pub params: RenderParams,
}

impl ServiceTarget {
    /// Validate `service` and derive its target from the current globals.
    pub fn from_config(
        service: &ServiceConfig,
        global: &GlobalConfig,
    ) -> Result<Self, Vec<ValidationError>> {
        let kind = validate_service(service)?;

        let (dir, params) = match kind {
            ServiceKind::Http => {
                let tls = global.tls_paths().map(|(cert, key)| TlsParams {
                    certificate: cert.to_string(),
                    certificate_key: key.to_string(),
                    force_https: global.force_https,
                });
                let params = HttpParams {
                    upstream_name: service.upstream_name.clone(),
                    domain: service.domain.clone().unwrap_or_default(),
                    path: service
                        .path
                        .clone()
                        .filter(|p| !p.is_empty())
                        .unwrap_or_else(|| "/".to_string()),
                    proxy: service.proxy_options(global).clone(),
                    tls,
                };
                (&global.nginx_config_dir, RenderParams::Http(params))
            }
            ServiceKind::Stream => {
                let sni = service.enable_sni.then(|| SniParams {
                    map_variable: format!("{}_sni_upstream", variable_safe(&service.name)),
                    domain_routes: service.domain_routes.clone(),
                    default_route: service
                        .default_route
                        .clone()
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| service.upstream_name.clone()),
                    static_upstreams: service.static_upstreams.clone(),
                });
                let params = StreamParams {
                    upstream_name: service.upstream_name.clone(),
                    listen_port: service.listen_port.unwrap_or_default(),
                    sni,
                };
                (&global.stream_config_dir, RenderParams::Stream(params))
            }
        };

        let sni = matches!(&params, RenderParams::Stream(p) if p.sni.is_some());
        let template = global.template_file(kind, sni).map(PathBuf::from);

        Ok(Self {
            service_name: service.name.clone(),
            kind,
            target_port: service.target_port().unwrap_or_default(),
            artifact_path: artifact_path(Path::new(dir), &service.name),
            template,
            params,
        })
    }
}

/// Well-known artifact location for a service.
pub fn artifact_path(dir: &Path, service_name: &str) -> PathBuf {
    dir.join(format!("{service_name}.conf"))
}

/// nginx variable names allow only alphanumerics and underscores.
fn variable_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
