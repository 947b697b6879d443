//! nginx `http` context rendering.

use std::fmt::Write;

use crate::render::{write_upstream, HttpParams, RenderError, TlsParams};
use crate::upstream::UpstreamMember;

const DEFAULT_HEADERS: [&str; 4] = [
    "Host $host",
    "X-Real-IP $remote_addr",
    "X-Forwarded-For $proxy_add_x_forwarded_for",
    "X-Forwarded-Proto $scheme",
];

/// Render an upstream block plus the server block(s) for one http service.
pub fn render(params: &HttpParams, members: &[UpstreamMember]) -> Result<String, RenderError> {
    if members.is_empty() {
        return Err(RenderError::NoMembers(params.upstream_name.clone()));
    }

    let mut out = String::new();
    write_upstream(&mut out, &params.upstream_name, members)?;

    match &params.tls {
        None => {
            out.push('\n');
            write_server(&mut out, params, &["80"], None)?;
        }
        Some(tls) if tls.force_https => {
            writeln!(out)?;
            writeln!(out, "server {{")?;
            writeln!(out, "    listen 80;")?;
            writeln!(out, "    server_name {};", params.domain)?;
            writeln!(out, "    return 301 https://$host$request_uri;")?;
            writeln!(out, "}}")?;
            out.push('\n');
            write_server(&mut out, params, &["443 ssl"], Some(tls))?;
        }
        Some(tls) => {
            out.push('\n');
            write_server(&mut out, params, &["80", "443 ssl"], Some(tls))?;
        }
    }

    Ok(out)
}

fn write_server(
    out: &mut String,
    params: &HttpParams,
    listens: &[&str],
    tls: Option<&TlsParams>,
) -> Result<(), RenderError> {
    let proxy = &params.proxy;

    writeln!(out, "server {{")?;
    for listen in listens {
        writeln!(out, "    listen {listen};")?;
    }
    writeln!(out, "    server_name {};", params.domain)?;

    if let Some(tls) = tls {
        writeln!(out)?;
        writeln!(out, "    ssl_certificate {};", tls.certificate)?;
        writeln!(out, "    ssl_certificate_key {};", tls.certificate_key)?;
    }

    if let Some(size) = proxy.client_max_body_size.as_deref().filter(|s| !s.is_empty()) {
        writeln!(out)?;
        writeln!(out, "    client_max_body_size {size};")?;
    }

    writeln!(out)?;
    writeln!(out, "    location {} {{", params.path)?;
    writeln!(out, "        proxy_pass http://{}/;", params.upstream_name)?;

    let http_version = if proxy.enable_websocket {
        Some("1.1")
    } else {
        proxy.proxy_http_version.as_deref().filter(|v| !v.is_empty())
    };
    if let Some(version) = http_version {
        writeln!(out, "        proxy_http_version {version};")?;
    }
    if proxy.enable_websocket {
        writeln!(out, "        proxy_set_header Upgrade $http_upgrade;")?;
        writeln!(out, "        proxy_set_header Connection \"upgrade\";")?;
    }

    if proxy.proxy_headers.is_empty() {
        for header in DEFAULT_HEADERS {
            writeln!(out, "        proxy_set_header {header};")?;
        }
    } else {
        for header in &proxy.proxy_headers {
            writeln!(out, "        proxy_set_header {};", header.trim_end_matches(';'))?;
        }
    }

    if let Some(redirect) = proxy.proxy_redirect.as_deref().filter(|r| !r.is_empty()) {
        writeln!(out, "        proxy_redirect {redirect};")?;
    }

    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(())
}
