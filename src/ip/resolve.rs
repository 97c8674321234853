//! Hostname resolution for block specifications.
//!
//! Administrators may type a hostname instead of an address. The name is
//! resolved with the system resolver before expansion; the prefix, if any,
//! is kept as written.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::error::AllocationError;

/// Replace the host part of `spec` with its first IPv4 address.
///
/// Literal IPv4 addresses are returned unchanged without a lookup.
pub fn resolve_ip_spec(spec: &str) -> Result<String, AllocationError> {
    let spec = spec.trim();
    let (host, prefix) = match spec.split_once('/') {
        Some((host, prefix)) => (host, Some(prefix)),
        None => (spec, None),
    };

    if host.parse::<Ipv4Addr>().is_ok() {
        return Ok(spec.to_string());
    }

    let address = lookup_ipv4(host)?;
    log::debug!("Resolved {} to {}", host, address);

    Ok(match prefix {
        Some(prefix) => format!("{}/{}", address, prefix),
        None => address.to_string(),
    })
}

fn lookup_ipv4(host: &str) -> Result<Ipv4Addr, AllocationError> {
    let addrs = (host, 0)
        .to_socket_addrs()
        .map_err(|_| AllocationError::InvalidAddress(host.to_string()))?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| AllocationError::InvalidAddress(host.to_string()))
}
