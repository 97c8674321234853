//! IPv4 block parsing and host enumeration.
//!
//! Blocks are written either as a bare address (`10.0.0.1`) or in CIDR
//! notation (`10.0.0.0/29`). Only small blocks are accepted: the prefix
//! length must be between `MIN_PREFIX_LEN` (32 addresses) and
//! `MAX_PREFIX_LEN` (a single host).

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::AllocationError;

/// Shortest accepted prefix, i.e. the largest block (/27 = 32 addresses)
pub const MIN_PREFIX_LEN: u8 = 27;
/// Longest accepted prefix, i.e. a single host
pub const MAX_PREFIX_LEN: u8 = 32;

/// A contiguous IPv4 block normalised to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Block {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Block {
    /// Parse a bare address or `address/prefix` block.
    ///
    /// The prefix is checked before the address, so `garbage/8` reports
    /// `CidrOutOfRange` rather than `InvalidAddress`.
    pub fn parse(spec: &str) -> Result<Self, AllocationError> {
        let spec = spec.trim();
        let (address, prefix_len) = match spec.split_once('/') {
            Some((address, prefix)) => (address, parse_prefix(prefix, spec)?),
            None => (spec, MAX_PREFIX_LEN),
        };

        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|_| AllocationError::InvalidAddress(address.to_string()))?;

        Ok(Self::new(address, prefix_len))
    }

    fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        let mask = u32::MAX << (32 - u32::from(prefix_len));
        Self {
            network: Ipv4Addr::from(u32::from(address) & mask),
            prefix_len,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block, network and broadcast included
    pub fn host_count(&self) -> u32 {
        1u32 << (32 - u32::from(self.prefix_len))
    }

    /// Every address of the block in ascending order
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network);
        (0..self.host_count()).map(move |offset| Ipv4Addr::from(first + offset))
    }
}

fn parse_prefix(prefix: &str, spec: &str) -> Result<u8, AllocationError> {
    let out_of_range = || AllocationError::CidrOutOfRange(spec.to_string());

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(out_of_range());
    }

    let prefix_len: u8 = prefix.parse().map_err(|_| out_of_range())?;
    if !(MIN_PREFIX_LEN..=MAX_PREFIX_LEN).contains(&prefix_len) {
        return Err(out_of_range());
    }
    Ok(prefix_len)
}

impl FromStr for Ipv4Block {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Ipv4Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}
