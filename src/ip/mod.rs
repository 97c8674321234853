//! IP address handling for allocation blocks.
//!
//! This module parses the IPv4 blocks administrators provision against a
//! node and enumerates their host addresses. Hostname resolution lives here
//! too, but runs before expansion and is never called by the expander.

pub mod cidr;
pub mod resolve;

// Re-export commonly used types
pub use cidr::{Ipv4Block, MAX_PREFIX_LEN, MIN_PREFIX_LEN};
pub use resolve::resolve_ip_spec;
