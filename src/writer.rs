//! Transactional provisioning of allocations against a node.

use serde::Serialize;

use crate::error::AllocationError;
use crate::expander::expand_blocks;
use crate::model::{Candidate, NodeId};
use crate::store::AllocationStore;

/// Outcome of one write call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Candidate rows offered to the store
    pub candidates: usize,
    /// Rows that did not exist before and are now visible
    pub inserted: usize,
}

impl WriteSummary {
    /// Candidates absorbed because the row already existed
    pub fn skipped(&self) -> usize {
        self.candidates.saturating_sub(self.inserted)
    }
}

/// Writes expanded candidates to a store, all or nothing
pub struct AllocationWriter<'a, S: AllocationStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: AllocationStore + ?Sized> AllocationWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Expand `ip_spec` × `port_specs` and insert the result for `node`.
    ///
    /// Validation happens entirely before the store is contacted, so an
    /// invalid block or port token never opens a transaction.
    pub fn write<T: AsRef<str>>(
        &self,
        node: NodeId,
        ip_spec: &str,
        port_specs: &[T],
        ip_alias: Option<&str>,
    ) -> Result<WriteSummary, AllocationError> {
        let chunks = expand_blocks(ip_spec, port_specs, ip_alias)?;
        self.write_chunks(node, &chunks)
    }

    /// Insert pre-expanded chunks for `node` inside one transaction.
    ///
    /// Each chunk is one `insert_ignoring` call. Any store error drops the
    /// transaction, which rolls back every chunk staged before it.
    pub fn write_chunks(&self, node: NodeId, chunks: &[Vec<Candidate>]) -> Result<WriteSummary, AllocationError> {
        let candidates: usize = chunks.iter().map(Vec::len).sum();
        if candidates == 0 {
            return Ok(WriteSummary::default());
        }

        let mut tx = self.store.begin()?;
        for chunk in chunks.iter().filter(|chunk| !chunk.is_empty()) {
            tx.insert_ignoring(node, chunk)?;
        }
        let inserted = tx.commit()?;

        log::debug!(
            "Wrote {} of {} candidate allocations to node {} in {} chunks",
            inserted,
            candidates,
            node,
            chunks.len()
        );
        Ok(WriteSummary { candidates, inserted })
    }
}
