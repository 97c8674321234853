//! Error types for allocation provisioning and selection.
//!
//! `AllocationError` is what callers of the expander, writer and selector
//! see. `StoreError` is raised by `AllocationStore` implementations and is
//! carried through `AllocationError::Store` unchanged.

use thiserror::Error;

use crate::model::{AllocationId, ServerId};

/// Caller-visible failures of the allocation core
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Network prefix outside the allowed block sizes (/27 through /32)
    #[error("CIDR notation only supports prefixes from /{min} to /{max}, got '{0}'", min = crate::ip::MIN_PREFIX_LEN, max = crate::ip::MAX_PREFIX_LEN)]
    CidrOutOfRange(String),

    /// Address part of the block is not an IPv4 address
    #[error("'{0}' is not a valid IPv4 address")]
    InvalidAddress(String),

    /// Port token matches neither `NNNN` nor `NNNN-NNNN`
    #[error("The mapping provided for '{0}' is invalid and could not be processed")]
    InvalidPortMapping(String),

    /// Port or range endpoint outside (1024, 65535]
    #[error("Port {0} is out of range: ports must be greater than {floor} and at most {ceil}", floor = crate::ports::PORT_FLOOR, ceil = crate::ports::PORT_CEIL)]
    PortOutOfRange(u32),

    /// Range token expands to more than the allowed number of ports
    #[error("Range {start}-{end} covers more than {limit} ports", limit = crate::ports::PORT_RANGE_LIMIT)]
    TooManyPortsInRange { start: u32, end: u32 },

    /// No free allocation satisfies the selection filter
    #[error("No allocations satisfying the requested deployment constraints are available")]
    NoViableAllocation,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the persistence boundary
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request-scoped deadline passed before the operation could apply
    #[error("Store operation timed out")]
    Timeout,

    #[error("Allocation {0} does not exist")]
    NotFound(AllocationId),

    /// Compare-and-set on `server_id` failed during release
    #[error("Allocation {id} is not assigned to server {server}")]
    NotOwner { id: AllocationId, server: ServerId },

    /// Another thread panicked while holding the pool lock
    #[error("Allocation pool lock is poisoned")]
    Poisoned,

    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is corrupt: {0}")]
    Snapshot(#[from] bincode::Error),
}
