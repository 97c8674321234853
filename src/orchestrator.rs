//! Plan orchestrator.
//!
//! Coordinates a provisioning plan end to end: writes every node's blocks,
//! places the requested servers, releases what the plan asks to release and
//! summarises the resulting pool.

use chrono::Utc;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Serialize;

use crate::config::{Config, DeploymentConfig, NodeConfig, ReleaseConfig};
use crate::error::{AllocationError, StoreError};
use crate::ip::resolve_ip_spec;
use crate::model::{Allocation, NodeId, ServerId};
use crate::selector::{AllocationSelector, SelectionFilter};
use crate::store::{AllocationStore, MemoryStore};
use crate::writer::{AllocationWriter, WriteSummary};

/// What happened to one block of one node
#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub node: NodeId,
    pub ip: String,
    pub ports: Vec<String>,
    #[serde(flatten)]
    pub summary: WriteSummary,
}

/// Result of placing one server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Assigned { server: ServerId, allocation: Allocation },
    Exhausted { server: ServerId },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    pub server: ServerId,
    pub released: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub assigned: usize,
    pub free: usize,
}

impl PoolStats {
    pub fn from_allocations(allocations: &[Allocation]) -> Self {
        let assigned = allocations.iter().filter(|a| a.is_assigned()).count();
        Self {
            total: allocations.len(),
            assigned,
            free: allocations.len() - assigned,
        }
    }
}

/// Summary of a full plan run
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub generated_at: String,
    pub blocks: Vec<BlockReport>,
    pub deployments: Vec<DeploymentOutcome>,
    pub releases: Vec<ReleaseReport>,
    pub pool: PoolStats,
}

/// Create an empty store configured from the plan's general section
pub fn build_store(config: &Config) -> MemoryStore {
    let store = match config.general.seed {
        Some(seed) => MemoryStore::with_seed(seed),
        None => MemoryStore::new(),
    };
    match config.general.op_timeout {
        Some(timeout) => store.with_op_timeout(timeout),
        None => store,
    }
}

/// Write every block of every node, one transaction per block
pub fn provision_nodes<S: AllocationStore + ?Sized>(
    store: &S,
    nodes: &[NodeConfig],
    resolve_hostnames: bool,
) -> Result<Vec<BlockReport>> {
    let writer = AllocationWriter::new(store);
    let mut reports = Vec::new();

    for node in nodes {
        let node_id = NodeId(node.id);
        for block in &node.blocks {
            let ip_spec = if resolve_hostnames {
                resolve_ip_spec(&block.ip)
                    .wrap_err_with(|| format!("Failed to resolve '{}' for node {}", block.ip, node.id))?
            } else {
                block.ip.clone()
            };

            let summary = writer
                .write(node_id, &ip_spec, &block.ports, block.alias.as_deref())
                .wrap_err_with(|| format!("Failed to provision {} on node {}", ip_spec, node.id))?;

            log::info!(
                "Node {}: {} -> {} new allocations ({} already present)",
                node.id,
                ip_spec,
                summary.inserted,
                summary.skipped()
            );
            reports.push(BlockReport {
                node: node_id,
                ip: ip_spec,
                ports: block.ports.clone(),
                summary,
            });
        }
    }

    Ok(reports)
}

/// Build the selection filter for one deployment
pub fn deployment_filter(deployment: &DeploymentConfig) -> Result<SelectionFilter, AllocationError> {
    Ok(SelectionFilter::builder()
        .dedicated(deployment.dedicated)
        .nodes(deployment.nodes.iter().copied().map(NodeId))
        .ports(&deployment.ports)?
        .build())
}

/// Place each server in order.
///
/// Exhaustion is recorded as an outcome; any other failure aborts the run.
pub fn run_deployments<S: AllocationStore + ?Sized>(
    store: &S,
    deployments: &[DeploymentConfig],
) -> Result<Vec<DeploymentOutcome>> {
    let selector = AllocationSelector::new(store);
    let mut outcomes = Vec::with_capacity(deployments.len());

    for deployment in deployments {
        let server = ServerId(deployment.server);
        let filter = deployment_filter(deployment)?;

        match selector.select(&filter, server) {
            Ok(allocation) => {
                log::info!("Server {} placed on {} (node {})", server, allocation.display_address(), allocation.node_id);
                outcomes.push(DeploymentOutcome::Assigned { server, allocation });
            }
            Err(AllocationError::NoViableAllocation) => {
                log::warn!("No viable allocation for server {}", server);
                outcomes.push(DeploymentOutcome::Exhausted { server });
            }
            Err(e) => return Err(e).wrap_err_with(|| format!("Failed to deploy server {}", server)),
        }
    }

    Ok(outcomes)
}

/// Release every allocation held by `server`, returning how many were freed.
///
/// A row that changed owner between listing and release is skipped.
pub fn release_server<S: AllocationStore + ?Sized>(store: &S, server: ServerId) -> Result<usize> {
    let selector = AllocationSelector::new(store);
    let held: Vec<Allocation> = store
        .allocations(None)?
        .into_iter()
        .filter(|allocation| allocation.server_id == Some(server))
        .collect();

    let mut released = 0;
    for allocation in held {
        match selector.release(allocation.id, server) {
            Ok(()) => released += 1,
            Err(AllocationError::Store(StoreError::NotOwner { .. })) => {
                log::warn!("Allocation {} changed owner before it could be released", allocation.id);
            }
            Err(e) => return Err(e).wrap_err_with(|| format!("Failed to release server {}", server)),
        }
    }

    log::info!("Released {} allocations held by server {}", released, server);
    Ok(released)
}

pub fn run_releases<S: AllocationStore + ?Sized>(store: &S, releases: &[ReleaseConfig]) -> Result<Vec<ReleaseReport>> {
    releases
        .iter()
        .map(|release| -> Result<ReleaseReport> {
            let server = ServerId(release.server);
            Ok(ReleaseReport {
                server,
                released: release_server(store, server)?,
            })
        })
        .collect()
}

/// Run a whole plan against `store`
pub fn run_plan<S: AllocationStore + ?Sized>(store: &S, config: &Config) -> Result<PlanReport> {
    let blocks = provision_nodes(store, &config.nodes, config.general.resolve_hostnames())?;
    let deployments = run_deployments(store, &config.deployments)?;
    let releases = run_releases(store, &config.releases)?;
    let pool = PoolStats::from_allocations(&store.allocations(None)?);

    log::info!("Pool now holds {} allocations ({} assigned, {} free)", pool.total, pool.assigned, pool.free);

    Ok(PlanReport {
        generated_at: Utc::now().to_rfc3339(),
        blocks,
        deployments,
        releases,
        pool,
    })
}
