//! Operator-supplied template files.
//!
//! # Responsibilities
//! - Render a service from the template file its target names
//! - Defer to the built-in renderer when no template is configured
//!
//! # Design Decisions
//! - Templates are Jinja-style (minijinja) and re-read on every render
//! - Undefined variables are errors, so a typo in a template surfaces as a
//!   render failure instead of a silently broken config

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::render::{
    HttpParams, NginxRenderer, RenderError, RenderInput, RenderParams, Renderer, StreamParams,
};
use crate::upstream::UpstreamMember;

#[derive(Serialize)]
struct Server<'a> {
    ip: &'a str,
    port: u16,
}

#[derive(Serialize)]
struct HttpContext<'a> {
    service_name: &'a str,
    upstream_name: &'a str,
    domain: &'a str,
    path: &'a str,
    upstream: Vec<Server<'a>>,
    enable_websocket: bool,
    client_max_body_size: Option<&'a str>,
    proxy_http_version: Option<&'a str>,
    proxy_headers: &'a [String],
    proxy_redirect: Option<&'a str>,
    enable_ssl: bool,
    ssl_certificate: Option<&'a str>,
    ssl_certificate_key: Option<&'a str>,
    force_https: bool,
}

impl<'a> HttpContext<'a> {
    fn new(service_name: &'a str, p: &'a HttpParams, upstream: Vec<Server<'a>>) -> Self {
        let tls = p.tls.as_ref();
        Self {
            service_name,
            upstream_name: &p.upstream_name,
            domain: &p.domain,
            path: &p.path,
            upstream,
            enable_websocket: p.proxy.enable_websocket,
            client_max_body_size: p.proxy.client_max_body_size.as_deref(),
            proxy_http_version: p.proxy.proxy_http_version.as_deref(),
            proxy_headers: &p.proxy.proxy_headers,
            proxy_redirect: p.proxy.proxy_redirect.as_deref(),
            enable_ssl: tls.is_some(),
            ssl_certificate: tls.map(|t| t.certificate.as_str()),
            ssl_certificate_key: tls.map(|t| t.certificate_key.as_str()),
            force_https: tls.is_some_and(|t| t.force_https),
        }
    }
}

#[derive(Serialize)]
struct StreamContext<'a> {
    service_name: &'a str,
    upstream_name: &'a str,
    listen_port: u16,
    upstream: Vec<Server<'a>>,
    enable_sni: bool,
    sni_variable: Option<&'a str>,
    domain_routes: Option<&'a BTreeMap<String, String>>,
    default_route: Option<&'a str>,
    static_upstreams: Option<&'a BTreeMap<String, Vec<String>>>,
}

impl<'a> StreamContext<'a> {
    fn new(service_name: &'a str, p: &'a StreamParams, upstream: Vec<Server<'a>>) -> Self {
        let sni = p.sni.as_ref();
        Self {
            service_name,
            upstream_name: &p.upstream_name,
            listen_port: p.listen_port,
            upstream,
            enable_sni: sni.is_some(),
            sni_variable: sni.map(|s| s.map_variable.as_str()),
            domain_routes: sni.map(|s| &s.domain_routes),
            default_route: sni.map(|s| s.default_route.as_str()),
            static_upstreams: sni.map(|s| &s.static_upstreams),
        }
    }
}

/// Renders from the template file named by the input, otherwise defers to
/// `fallback`.
pub struct TemplateRenderer<R = NginxRenderer> {
    env: Environment<'static>,
    fallback: R,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::with_fallback(NginxRenderer)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Renderer> TemplateRenderer<R> {
    pub fn with_fallback(fallback: R) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        Self { env, fallback }
    }

    fn render_file(&self, path: &Path, input: &RenderInput<'_>) -> Result<String, RenderError> {
        if input.members.is_empty() {
            return Err(RenderError::NoMembers(
                input.params.upstream_name().to_string(),
            ));
        }

        let source = fs::read_to_string(path).map_err(|source| RenderError::TemplateLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let upstream = servers(input.members);

        let rendered = match input.params {
            RenderParams::Http(p) => self
                .env
                .render_str(&source, HttpContext::new(input.service_name, p, upstream)),
            RenderParams::Stream(p) => self
                .env
                .render_str(&source, StreamContext::new(input.service_name, p, upstream)),
        };
        rendered.map_err(|source| RenderError::Template {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<R: Renderer> Renderer for TemplateRenderer<R> {
    fn render(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        match input.template {
            Some(path) => self.render_file(path, input),
            None => self.fallback.render(input),
        }
    }
}

fn servers(members: &[UpstreamMember]) -> Vec<Server<'_>> {
    members
        .iter()
        .map(|m| Server {
            ip: &m.address,
            port: m.port,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyOptions;
    use crate::render::SniParams;

    const HTTP_TEMPLATE: &str = "\
upstream {{ upstream_name }} {
{% for server in upstream %}
    server {{ server.ip }}:{{ server.port }};
{% endfor %}
}
server {
    listen 80;
    server_name {{ domain }};
{% if client_max_body_size %}
    client_max_body_size {{ client_max_body_size }};
{% endif %}
    location {{ path }} {
        proxy_pass http://{{ upstream_name }}/;
    }
}
";

    fn http_params() -> RenderParams {
        RenderParams::Http(HttpParams {
            upstream_name: "api_backend".into(),
            domain: "api.example.com".into(),
            path: "/".into(),
            proxy: ProxyOptions {
                client_max_body_size: Some("20m".into()),
                ..Default::default()
            },
            tls: None,
        })
    }

    fn members() -> Vec<UpstreamMember> {
        vec![
            UpstreamMember::new("10.0.0.1", 8080),
            UpstreamMember::new("10.0.0.2", 8081),
        ]
    }

    #[test]
    fn test_http_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("http.conf.tpl");
        fs::write(&path, HTTP_TEMPLATE).unwrap();

        let params = http_params();
        let members = members();
        let text = TemplateRenderer::new()
            .render(&RenderInput {
                service_name: "api",
                template: Some(&path),
                params: &params,
                members: &members,
            })
            .unwrap();

        assert!(text.starts_with("upstream api_backend {\n"));
        assert!(text.contains("    server 10.0.0.1:8080;\n"));
        assert!(text.contains("    server 10.0.0.2:8081;\n"));
        assert!(text.contains("    client_max_body_size 20m;\n"));
        assert!(text.contains("        proxy_pass http://api_backend/;\n"));
        assert!(!text.contains("{%"));
    }

    #[test]
    fn test_sni_stream_template_sees_routes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream-sni.conf.tpl");
        fs::write(
            &path,
            "{% for domain, target in domain_routes|items %}{{ domain }}={{ target }};{% endfor %}\
             default={{ default_route }};listen={{ listen_port }}",
        )
        .unwrap();

        let mut domain_routes = BTreeMap::new();
        domain_routes.insert("a.example.com".to_string(), "a_pool".to_string());
        let params = RenderParams::Stream(StreamParams {
            upstream_name: "gw_backend".into(),
            listen_port: 443,
            sni: Some(SniParams {
                map_variable: "gw_sni_upstream".into(),
                domain_routes,
                default_route: "gw_backend".into(),
                static_upstreams: BTreeMap::new(),
            }),
        });
        let members = members();
        let text = TemplateRenderer::new()
            .render(&RenderInput {
                service_name: "gw",
                template: Some(&path),
                params: &params,
                members: &members,
            })
            .unwrap();

        assert_eq!(text, "a.example.com=a_pool;default=gw_backend;listen=443");
    }

    #[test]
    fn test_missing_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tpl");
        let params = http_params();
        let members = members();

        let err = TemplateRenderer::new()
            .render(&RenderInput {
                service_name: "api",
                template: Some(&path),
                params: &params,
                members: &members,
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateLoad { .. }));
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.tpl");
        fs::write(&path, "server_name {{ domian }};").unwrap();
        let params = http_params();
        let members = members();

        let err = TemplateRenderer::new()
            .render(&RenderInput {
                service_name: "api",
                template: Some(&path),
                params: &params,
                members: &members,
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::Template { .. }));
    }

    #[test]
    fn test_without_template_uses_builtin_layout() {
        let params = http_params();
        let members = members();
        let input = RenderInput {
            service_name: "api",
            template: None,
            params: &params,
            members: &members,
        };

        assert_eq!(
            TemplateRenderer::new().render(&input).unwrap(),
            NginxRenderer.render(&input).unwrap()
        );
    }
}
