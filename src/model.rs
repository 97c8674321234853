//! Domain types shared by the expander, writer, selector and stores.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a compute node that owns allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Identifier of the workload occupying an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

/// Store-assigned primary key of an allocation row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An allocation that has not been written yet.
///
/// Candidates are produced by the expander and are always unassigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub ip_alias: Option<String>,
}

impl Candidate {
    pub fn new(ip: Ipv4Addr, port: u16, ip_alias: Option<String>) -> Self {
        Self { ip, port, ip_alias }
    }
}

/// One IP:port binding owned by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub node_id: NodeId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub ip_alias: Option<String>,
    /// `None` while the allocation is free
    pub server_id: Option<ServerId>,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    pub fn is_assigned(&self) -> bool {
        self.server_id.is_some()
    }

    /// Uniqueness key of the row
    pub fn key(&self) -> (NodeId, Ipv4Addr, u16) {
        (self.node_id, self.ip, self.port)
    }

    /// Render as `ip:port`, preferring the alias when one is set
    pub fn display_address(&self) -> String {
        match &self.ip_alias {
            Some(alias) => format!("{}:{}", alias, self.port),
            None => format!("{}:{}", self.ip, self.port),
        }
    }
}
