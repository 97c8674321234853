//! Expansion of administrator input into allocation candidates.
//!
//! Turns an IPv4 block and a list of port tokens into the exact set of
//! `(ip, port)` pairs to create. Expansion is pure: every token is validated
//! before any candidate is produced, and nothing touches a store.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::error::AllocationError;
use crate::ip::Ipv4Block;
use crate::model::Candidate;
use crate::ports::{parse_port_specs, PortSpec};

/// Expand `ip_spec` × `port_specs` into a flat candidate list.
///
/// Order is host address, then token, then ascending port within a range.
/// Pairs already produced by an earlier token are dropped.
///
/// # Examples
/// ```
/// use nodealloc::expander::expand;
///
/// let candidates = expand("10.0.0.0/30", &["25565"], None).unwrap();
/// assert_eq!(candidates.len(), 4);
/// assert!(expand("10.0.0.0/30", &["2000-3500"], None).is_err());
/// ```
pub fn expand<S: AsRef<str>>(
    ip_spec: &str,
    port_specs: &[S],
    ip_alias: Option<&str>,
) -> Result<Vec<Candidate>, AllocationError> {
    Ok(expand_blocks(ip_spec, port_specs, ip_alias)?.into_iter().flatten().collect())
}

/// Expand into one chunk per (host, token) pair.
///
/// The writer issues one insert per chunk, which keeps a single statement
/// bounded by `PORT_RANGE_LIMIT` rows. Empty chunks (every pair a
/// duplicate of an earlier token) are omitted.
pub fn expand_blocks<S: AsRef<str>>(
    ip_spec: &str,
    port_specs: &[S],
    ip_alias: Option<&str>,
) -> Result<Vec<Vec<Candidate>>, AllocationError> {
    let block = Ipv4Block::parse(ip_spec)?;
    let specs = parse_port_specs(port_specs)?;
    Ok(expand_parsed(&block, &specs, ip_alias))
}

/// Expand an already validated block and token list
pub fn expand_parsed(block: &Ipv4Block, specs: &[PortSpec], ip_alias: Option<&str>) -> Vec<Vec<Candidate>> {
    let mut seen: HashSet<(Ipv4Addr, u16)> = HashSet::new();
    let mut chunks = Vec::new();

    for ip in block.hosts() {
        for spec in specs {
            let chunk: Vec<Candidate> = spec
                .ports()
                .filter(|&port| seen.insert((ip, port)))
                .map(|port| Candidate::new(ip, port, ip_alias.map(str::to_string)))
                .collect();

            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }
    }

    chunks
}
