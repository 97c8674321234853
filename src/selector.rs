//! Deployment-time allocation selection.
//!
//! A `SelectionFilter` is built once per deployment request and never
//! mutated afterwards, so concurrent requests cannot observe each other's
//! configuration. The selector hands the filter to the store's atomic
//! `claim_random`; it never reads a candidate and assigns it in two steps.

use crate::error::AllocationError;
use crate::model::{Allocation, AllocationId, NodeId, ServerId};
use crate::ports::{parse_port_specs, PortSpec};
use crate::store::AllocationStore;

/// Constraints a claimed allocation must satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionFilter {
    dedicated: bool,
    nodes: Vec<NodeId>,
    ports: Vec<PortSpec>,
}

impl SelectionFilter {
    pub fn builder() -> SelectionFilterBuilder {
        SelectionFilterBuilder::default()
    }

    /// Whether the whole IP must be free of other servers
    pub fn dedicated(&self) -> bool {
        self.dedicated
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    /// An empty node list accepts every node
    pub fn matches_node(&self, node: NodeId) -> bool {
        self.nodes.is_empty() || self.nodes.contains(&node)
    }

    /// An empty port list accepts every port
    pub fn matches_port(&self, port: u16) -> bool {
        self.ports.is_empty() || self.ports.iter().any(|spec| spec.contains(port))
    }

    /// Node and port constraints only.
    ///
    /// Whether the row is free and the dedicated policy both depend on the
    /// rest of the pool and are checked by the store.
    pub fn matches(&self, allocation: &Allocation) -> bool {
        self.matches_node(allocation.node_id) && self.matches_port(allocation.port)
    }
}

/// Incremental construction of a `SelectionFilter`
#[derive(Debug, Clone, Default)]
pub struct SelectionFilterBuilder {
    dedicated: bool,
    nodes: Vec<NodeId>,
    ports: Vec<PortSpec>,
}

impl SelectionFilterBuilder {
    /// Only pick allocations whose IP has no other allocation assigned
    pub fn dedicated(mut self, dedicated: bool) -> Self {
        self.dedicated = dedicated;
        self
    }

    /// Restrict candidates to these nodes
    pub fn nodes<I: IntoIterator<Item = NodeId>>(mut self, nodes: I) -> Self {
        self.nodes = nodes.into_iter().collect();
        self
    }

    /// Restrict candidates to these ports and port ranges.
    ///
    /// Tokens use the provisioning grammar and are validated here, before
    /// any store call is made.
    pub fn ports<S: AsRef<str>>(mut self, tokens: &[S]) -> Result<Self, AllocationError> {
        self.ports = parse_port_specs(tokens)?;
        Ok(self)
    }

    /// Restrict candidates to already validated port tokens
    pub fn port_specs(mut self, specs: Vec<PortSpec>) -> Self {
        self.ports = specs;
        self
    }

    pub fn build(self) -> SelectionFilter {
        SelectionFilter {
            dedicated: self.dedicated,
            nodes: self.nodes,
            ports: self.ports,
        }
    }
}

/// Claims free allocations from a store
pub struct AllocationSelector<'a, S: AllocationStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: AllocationStore + ?Sized> AllocationSelector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Claim one free allocation matching `filter` for `server`.
    ///
    /// Fails with `NoViableAllocation` when nothing matches; callers are
    /// expected to handle that as a normal outcome.
    pub fn select(&self, filter: &SelectionFilter, server: ServerId) -> Result<Allocation, AllocationError> {
        let allocation = self
            .store
            .claim_random(filter, server)?
            .ok_or(AllocationError::NoViableAllocation)?;

        log::debug!(
            "Selected {}:{} on node {} for server {}",
            allocation.ip,
            allocation.port,
            allocation.node_id,
            server
        );
        Ok(allocation)
    }

    /// Return an allocation held by `server` to the pool
    pub fn release(&self, id: AllocationId, server: ServerId) -> Result<(), AllocationError> {
        self.store.release(id, server)?;
        Ok(())
    }
}
