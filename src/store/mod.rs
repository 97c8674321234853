//! Persistence boundary for the allocation pool.
//!
//! The core never reads and then writes a row on its own; every state
//! transition of `server_id` goes through one store call that performs the
//! check and the update together. Implementations must be safe to share
//! between threads handling independent requests.

pub mod memory;

use crate::error::StoreError;
use crate::model::{Allocation, AllocationId, Candidate, NodeId, ServerId};
use crate::selector::SelectionFilter;

pub use memory::MemoryStore;

/// The allocation pool as seen by the writer and the selector
pub trait AllocationStore: Send + Sync {
    /// Open a write transaction.
    ///
    /// Rows staged in the transaction become visible only on `commit`;
    /// dropping it discards them.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    /// Pick one free allocation matching `filter` uniformly at random and
    /// assign it to `server` in the same atomic step.
    ///
    /// Returns `Ok(None)` when no free allocation matches.
    fn claim_random(
        &self,
        filter: &SelectionFilter,
        server: ServerId,
    ) -> Result<Option<Allocation>, StoreError>;

    /// Clear `server_id` on `id`, but only if it is currently `server`
    fn release(&self, id: AllocationId, server: ServerId) -> Result<(), StoreError>;

    /// List stored allocations, optionally restricted to one node
    fn allocations(&self, node: Option<NodeId>) -> Result<Vec<Allocation>, StoreError>;
}

/// A unit of work against the store
pub trait StoreTransaction {
    /// Stage `candidates` as new unassigned rows of `node`.
    ///
    /// Rows whose `(node, ip, port)` already exists are skipped at commit
    /// without error, leaving the stored row untouched.
    fn insert_ignoring(&mut self, node: NodeId, candidates: &[Candidate]) -> Result<(), StoreError>;

    /// Apply every staged row atomically, returning how many were new
    fn commit(self: Box<Self>) -> Result<usize, StoreError>;
}
