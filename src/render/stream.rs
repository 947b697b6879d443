//! nginx `stream` context rendering, with optional SNI routing.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::render::{write_upstream, RenderError, SniParams, StreamParams};
use crate::upstream::UpstreamMember;

/// Render the upstream(s) and the listening server for one stream service.
pub fn render(params: &StreamParams, members: &[UpstreamMember]) -> Result<String, RenderError> {
    if members.is_empty() {
        return Err(RenderError::NoMembers(params.upstream_name.clone()));
    }

    match &params.sni {
        None => render_plain(params, members),
        Some(sni) => render_sni(params, sni, members),
    }
}

fn render_plain(params: &StreamParams, members: &[UpstreamMember]) -> Result<String, RenderError> {
    let mut out = String::new();
    write_upstream(&mut out, &params.upstream_name, members)?;
    writeln!(out)?;
    writeln!(out, "server {{")?;
    writeln!(out, "    listen {};", params.listen_port)?;
    writeln!(out, "    proxy_pass {};", params.upstream_name)?;
    writeln!(out, "}}")?;
    Ok(out)
}

fn render_sni(
    params: &StreamParams,
    sni: &SniParams,
    members: &[UpstreamMember],
) -> Result<String, RenderError> {
    let own = params.upstream_name.as_str();

    let mut targets: BTreeSet<&str> = BTreeSet::new();
    targets.insert(own);
    targets.insert(sni.default_route.as_str());
    for (domain, upstream) in &sni.domain_routes {
        if upstream != own && !sni.static_upstreams.contains_key(upstream) {
            return Err(RenderError::UnknownUpstream {
                domain: domain.clone(),
                upstream: upstream.clone(),
            });
        }
        targets.insert(upstream.as_str());
    }
    if sni.default_route != own && !sni.static_upstreams.contains_key(&sni.default_route) {
        return Err(RenderError::UnknownUpstream {
            domain: "default".into(),
            upstream: sni.default_route.clone(),
        });
    }

    let mut out = String::new();
    writeln!(out, "map $ssl_preread_server_name ${} {{", sni.map_variable)?;
    for (domain, upstream) in &sni.domain_routes {
        writeln!(out, "    {domain} {upstream};")?;
    }
    writeln!(out, "    default {};", sni.default_route)?;
    writeln!(out, "}}")?;

    for target in targets {
        writeln!(out)?;
        if target == own {
            write_upstream(&mut out, target, members)?;
            continue;
        }
        let servers = &sni.static_upstreams[target];
        if servers.is_empty() {
            return Err(RenderError::EmptyStaticUpstream(target.to_string()));
        }
        write_upstream(&mut out, target, servers)?;
    }

    writeln!(out)?;
    writeln!(out, "server {{")?;
    writeln!(out, "    listen {};", params.listen_port)?;
    writeln!(out, "    ssl_preread on;")?;
    writeln!(out, "    proxy_pass ${};", sni.map_variable)?;
    writeln!(out, "}}")?;
    Ok(out)
}
