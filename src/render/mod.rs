//! Configuration rendering subsystem.
//!
//! # Data Flow
//! ```text
//! RenderParams (per-service, derived from declared config)
//!   + members (current upstream set)
//!     → Renderer::render
//!         - http.rs   (upstream + server/location blocks)
//!         - stream.rs (upstream + server, optional SNI map)
//!         - template.rs (operator-supplied template file, when configured)
//!     → configuration text
//! ```
//!
//! # Design Decisions
//! - Built-in rendering is a pure function: no filesystem, runtime or proxy
//!   access. Template files are read at render time so edits apply on the
//!   next change without a restart
//! - Identical input always yields byte-identical output (ordered maps only)
//! - Output format sits behind the `Renderer` trait so it can be swapped
//!   without touching the registry

pub mod http;
pub mod stream;
pub mod template;

pub use template::TemplateRenderer;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ProxyOptions;
use crate::upstream::UpstreamMember;

/// Rendering failures. The previous artifact is left in place.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("upstream '{0}' has no members to render")]
    NoMembers(String),

    #[error("SNI route for '{domain}' points at unknown upstream '{upstream}'")]
    UnknownUpstream { domain: String, upstream: String },

    #[error("static upstream '{0}' lists no servers")]
    EmptyStaticUpstream(String),

    #[error("formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("failed to read template {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {path} failed: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
}

/// TLS material for http servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsParams {
    pub certificate: String,
    pub certificate_key: String,
    pub force_https: bool,
}

/// Template parameters for an http service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpParams {
    pub upstream_name: String,
    pub domain: String,
    pub path: String,
    pub proxy: ProxyOptions,
    pub tls: Option<TlsParams>,
}

/// SNI routing table for a stream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniParams {
    /// nginx variable (without "$") receiving the chosen upstream.
    pub map_variable: String,
    pub domain_routes: BTreeMap<String, String>,
    pub default_route: String,
    pub static_upstreams: BTreeMap<String, Vec<String>>,
}

/// Template parameters for a stream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub upstream_name: String,
    pub listen_port: u16,
    pub sni: Option<SniParams>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderParams {
    Http(HttpParams),
    Stream(StreamParams),
}

impl RenderParams {
    pub fn upstream_name(&self) -> &str {
        match self {
            RenderParams::Http(p) => &p.upstream_name,
            RenderParams::Stream(p) => &p.upstream_name,
        }
    }
}

/// Everything a renderer needs for one service.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub service_name: &'a str,
    /// Operator template to use instead of the built-in layout.
    pub template: Option<&'a Path>,
    pub params: &'a RenderParams,
    pub members: &'a [UpstreamMember],
}

/// Turns a service description into proxy configuration text.
pub trait Renderer: Send + Sync {
    fn render(&self, input: &RenderInput<'_>) -> Result<String, RenderError>;
}

/// Renders nginx `http` and `stream` context snippets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NginxRenderer;

impl Renderer for NginxRenderer {
    fn render(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        match input.params {
            RenderParams::Http(params) => http::render(params, input.members),
            RenderParams::Stream(params) => stream::render(params, input.members),
        }
    }
}

/// Write one `upstream` block.
fn write_upstream<I, S>(out: &mut String, name: &str, servers: I) -> Result<(), RenderError>
where
    I: IntoIterator<Item = S>,
    S: std::fmt::Display,
{
    writeln!(out, "upstream {name} {{")?;
    for server in servers {
        writeln!(out, "    server {server};")?;
    }
    writeln!(out, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_upstream() {
        let mut out = String::new();
        let members = vec![
            UpstreamMember::new("10.0.0.1", 80),
            UpstreamMember::new("10.0.0.2", 8080),
        ];
        write_upstream(&mut out, "web", &members).unwrap();
        assert_eq!(
            out,
            "upstream web {\n    server 10.0.0.1:80;\n    server 10.0.0.2:8080;\n}\n"
        );
    }
}
