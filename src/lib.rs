//! # nodealloc - network allocation provisioning and selection
//!
//! This library manages the pool of `(ip, port)` allocations that a hosting
//! panel hands out to game and application servers running on its nodes.
//!
//! ## Overview
//!
//! Administrators provision allocations by giving a node an IPv4 block and a
//! list of port tokens. When a server is deployed, one free allocation is
//! picked at random among those satisfying the deployment's constraints and
//! claimed for it in a single atomic step.
//!
//! ## Key Features
//!
//! - **Block expansion**: `/27` to `/32` blocks times single ports and
//!   `start-end` ranges of up to 1000 ports, validated before anything is
//!   written
//! - **Idempotent writes**: re-provisioning the same block never duplicates a
//!   row and never disturbs an assigned one
//! - **Constrained selection**: node whitelist, port whitelist and the
//!   dedicated-IP policy
//! - **Race-free claims**: picking and assigning happen in one store call, so
//!   concurrent deployments can never receive the same allocation
//!
//! ## Architecture
//!
//! - `ip`: IPv4 block parsing, host enumeration, hostname resolution
//! - `ports`: port token grammar and limits
//! - `expander`: block × ports expansion into candidates
//! - `writer`: transactional, duplicate-tolerant provisioning
//! - `selector`: selection filters and atomic claims
//! - `store`: the `AllocationStore` boundary and the in-process `MemoryStore`
//! - `config` / `config_loader`: YAML provisioning plans
//! - `orchestrator`: runs a plan and reports the outcome
//!
//! ## Example Usage
//!
//! ```rust
//! use nodealloc::model::{NodeId, ServerId};
//! use nodealloc::selector::{AllocationSelector, SelectionFilter};
//! use nodealloc::store::MemoryStore;
//! use nodealloc::writer::AllocationWriter;
//!
//! let store = MemoryStore::with_seed(42);
//! AllocationWriter::new(&store).write(NodeId(1), "10.0.0.0/30", &["25565"], None)?;
//!
//! let filter = SelectionFilter::builder().nodes([NodeId(1)]).build();
//! let allocation = AllocationSelector::new(&store).select(&filter, ServerId(7))?;
//! assert_eq!(allocation.port, 25565);
//! # Ok::<(), nodealloc::error::AllocationError>(())
//! ```
//!
//! ## Error Handling
//!
//! Library operations return `AllocationError`. Validation errors are raised
//! before any write, duplicate rows are absorbed silently, and
//! `NoViableAllocation` is an expected outcome of selection. The binary and
//! the plan loader use `color_eyre` for reporting with context.

pub mod error;
pub mod model;
pub mod ip;
pub mod ports;
pub mod expander;
pub mod writer;
pub mod selector;
pub mod store;
pub mod config;
pub mod config_loader;
pub mod orchestrator;
