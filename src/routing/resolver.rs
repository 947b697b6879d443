//! Address resolution under different network topologies.
//!
//! # Resolution Order
//! ```text
//! 1. host network       → host_ip : target_port
//! 2. attached network   → network ip : target_port   (macvlan, user networks)
//! 3. default bridge     → host_ip : published host port (tcp, then udp)
//! 4. exposed port only  → host_ip : target_port
//! ```
//!
//! # Design Decisions
//! - Pure: no runtime calls, no hidden state between calls
//! - Attached networks are scanned in name order so the choice is stable
//! - Any missing piece is an explicit error, never a zero-value address

use thiserror::Error;

use crate::runtime::ContainerInfo;
use crate::upstream::UpstreamMember;

const HOST_NETWORK: &str = "host";
const BRIDGE_NETWORK: &str = "bridge";

/// Why a container has no usable upstream address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{mode} networking needs global.host_ip, which is not set")]
    HostIpUnset { mode: &'static str },

    #[error("container port {port} has no host binding on the bridge network")]
    PortNotPublished { port: u16 },

    #[error("no reachable network or exposed port {port}")]
    NoReachableNetwork { port: u16 },
}

/// Resolve where the proxy can reach `container` for `target_port`.
pub fn resolve_address(
    container: &ContainerInfo,
    target_port: u16,
    host_ip: Option<&str>,
) -> Result<UpstreamMember, ResolveError> {
    let host_ip = host_ip.filter(|ip| !ip.is_empty());
    let require_host_ip = |mode| host_ip.ok_or(ResolveError::HostIpUnset { mode });

    if is_host_mode(container) {
        let ip = require_host_ip(HOST_NETWORK)?;
        return Ok(UpstreamMember::new(ip, target_port));
    }

    let attached = container
        .networks
        .iter()
        .find(|(name, ip)| name.as_str() != BRIDGE_NETWORK && !ip.is_empty());
    if let Some((_, ip)) = attached {
        return Ok(UpstreamMember::new(ip.as_str(), target_port));
    }

    if container.networks.contains_key(BRIDGE_NETWORK) {
        let ip = require_host_ip(BRIDGE_NETWORK)?;
        let port = published_port(container, target_port)
            .ok_or(ResolveError::PortNotPublished { port: target_port })?;
        return Ok(UpstreamMember::new(ip, port));
    }

    if is_exposed(container, target_port) {
        let ip = require_host_ip("exposed-port")?;
        return Ok(UpstreamMember::new(ip, target_port));
    }

    Err(ResolveError::NoReachableNetwork { port: target_port })
}

fn is_host_mode(container: &ContainerInfo) -> bool {
    container.networks.contains_key(HOST_NETWORK)
        || container.network_mode.as_deref() == Some(HOST_NETWORK)
}

/// First host port bound to `port`, trying tcp before udp.
fn published_port(container: &ContainerInfo, port: u16) -> Option<u16> {
    ["tcp", "udp"].iter().find_map(|proto| {
        container
            .ports
            .get(&format!("{port}/{proto}"))?
            .iter()
            .find_map(|binding| binding.host_port.parse::<u16>().ok())
            .filter(|p| *p != 0)
    })
}

fn is_exposed(container: &ContainerInfo, port: u16) -> bool {
    ["tcp", "udp"]
        .iter()
        .any(|proto| container.ports.contains_key(&format!("{port}/{proto}")))
}
