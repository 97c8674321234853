//! In-process allocation store.
//!
//! All rows live behind a single mutex, so a claim's pick and assignment
//! happen inside one critical section. Randomness comes from a seedable
//! `StdRng` to keep selections reproducible in tests and dry runs.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{AllocationStore, StoreTransaction};
use crate::error::StoreError;
use crate::model::{Allocation, AllocationId, Candidate, NodeId, ServerId};
use crate::selector::SelectionFilter;

const SNAPSHOT_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;
const LOCK_RETRY_INTERVAL: Duration = Duration::from_micros(50);

type RowKey = (NodeId, Ipv4Addr, u16);

struct Pool {
    rows: Vec<Allocation>,
    index: HashSet<RowKey>,
    next_id: u64,
    rng: StdRng,
}

impl Pool {
    fn new(rng: StdRng) -> Self {
        Self {
            rows: Vec::new(),
            index: HashSet::new(),
            next_id: 1,
            rng,
        }
    }

    fn from_rows(rows: Vec<Allocation>, next_id: u64, rng: StdRng) -> Self {
        let index = rows.iter().map(Allocation::key).collect();
        Self { rows, index, next_id, rng }
    }
}

/// On-disk form of the pool
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    next_id: u64,
    rows: Vec<Allocation>,
}

/// Mutex-guarded allocation pool
pub struct MemoryStore {
    pool: Mutex<Pool>,
    op_timeout: Option<Duration>,
}

impl MemoryStore {
    /// Empty store with an entropy-seeded generator
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Pool::new(StdRng::from_entropy())),
            op_timeout: None,
        }
    }

    /// Empty store whose random picks are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pool: Mutex::new(Pool::new(StdRng::seed_from_u64(seed))),
            op_timeout: None,
        }
    }

    /// Bound every claim, release and commit by `timeout`.
    ///
    /// An operation that cannot take the pool lock in time fails with
    /// `StoreError::Timeout` and leaves the pool unchanged.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout
    }

    /// Total number of rows
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock(None)?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Number of rows with no server assigned
    pub fn free_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock(None)?.rows.iter().filter(|row| !row.is_assigned()).count())
    }

    fn deadline(&self) -> Option<Instant> {
        self.op_timeout.map(|timeout| Instant::now() + timeout)
    }

    fn lock(&self, deadline: Option<Instant>) -> Result<MutexGuard<'_, Pool>, StoreError> {
        let Some(deadline) = deadline else {
            return self.pool.lock().map_err(|_| StoreError::Poisoned);
        };

        loop {
            match self.pool.try_lock() {
                Ok(guard) => {
                    // The lock may have been granted after the deadline
                    if Instant::now() > deadline {
                        return Err(StoreError::Timeout);
                    }
                    return Ok(guard);
                }
                Err(TryLockError::Poisoned(_)) => return Err(StoreError::Poisoned),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Timeout);
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }
    }

    /// Write the pool to `path` as zstd-compressed bincode.
    ///
    /// The snapshot is written to a sibling `.tmp` file, synced, then renamed
    /// over `path`, so an interrupted save leaves the previous snapshot intact.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let pool = self.lock(None)?;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            next_id: pool.next_id,
            rows: pool.rows.clone(),
        };
        drop(pool);

        let tmp_path = snapshot_tmp_path(path);
        let written = write_snapshot_file(&tmp_path, &snapshot).and_then(|()| {
            fs::rename(&tmp_path, path)?;
            Ok(())
        });
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written?;

        log::info!("Saved {} allocations to {}", snapshot.rows.len(), path.display());
        Ok(())
    }

    /// Restore a pool written by `save_snapshot`
    pub fn load_snapshot(path: &Path, seed: Option<u64>) -> Result<Self, StoreError> {
        let decoder = zstd::Decoder::new(BufReader::new(File::open(path)?))?;
        let snapshot: Snapshot = bincode::deserialize_from(decoder)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Backend(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        log::info!("Loaded {} allocations from {}", snapshot.rows.len(), path.display());

        Ok(Self {
            pool: Mutex::new(Pool::from_rows(snapshot.rows, snapshot.next_id, rng)),
            op_timeout: None,
        })
    }
}

fn snapshot_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_snapshot_file(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
    bincode::serialize_into(&mut encoder, snapshot)?;
    let file = encoder.finish()?.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            staged: Vec::new(),
            deadline: self.deadline(),
        }))
    }

    fn claim_random(
        &self,
        filter: &SelectionFilter,
        server: ServerId,
    ) -> Result<Option<Allocation>, StoreError> {
        let mut guard = self.lock(self.deadline())?;
        let pool = &mut *guard;

        // (node, ip) pairs that already host a server
        let occupied: HashSet<(NodeId, Ipv4Addr)> = if filter.dedicated() {
            pool.rows
                .iter()
                .filter(|row| row.is_assigned())
                .map(|row| (row.node_id, row.ip))
                .collect()
        } else {
            HashSet::new()
        };

        let candidates: Vec<usize> = pool
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_assigned() && filter.matches(row))
            .filter(|(_, row)| !occupied.contains(&(row.node_id, row.ip)))
            .map(|(position, _)| position)
            .collect();

        let Some(&position) = candidates.choose(&mut pool.rng) else {
            log::debug!("No free allocation matches {:?}", filter);
            return Ok(None);
        };

        let row = &mut pool.rows[position];
        row.server_id = Some(server);
        log::debug!(
            "Claimed allocation {} ({}:{}) on node {} for server {} out of {} candidates",
            row.id,
            row.ip,
            row.port,
            row.node_id,
            server,
            candidates.len()
        );
        Ok(Some(row.clone()))
    }

    fn release(&self, id: AllocationId, server: ServerId) -> Result<(), StoreError> {
        let mut pool = self.lock(self.deadline())?;
        let row = pool
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::NotFound(id))?;

        if row.server_id != Some(server) {
            return Err(StoreError::NotOwner { id, server });
        }
        row.server_id = None;
        log::debug!("Released allocation {} from server {}", id, server);
        Ok(())
    }

    fn allocations(&self, node: Option<NodeId>) -> Result<Vec<Allocation>, StoreError> {
        let pool = self.lock(None)?;
        Ok(pool
            .rows
            .iter()
            .filter(|row| node.map_or(true, |node| row.node_id == node))
            .cloned()
            .collect())
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staged: Vec<(NodeId, Candidate)>,
    deadline: Option<Instant>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn insert_ignoring(&mut self, node: NodeId, candidates: &[Candidate]) -> Result<(), StoreError> {
        self.staged
            .extend(candidates.iter().map(|candidate| (node, candidate.clone())));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<usize, StoreError> {
        let store = self.store;
        let mut guard = store.lock(self.deadline)?;
        let pool = &mut *guard;
        let created_at = Utc::now();
        let staged = self.staged.len();
        let mut inserted = 0;

        for (node_id, candidate) in self.staged {
            if !pool.index.insert((node_id, candidate.ip, candidate.port)) {
                continue;
            }
            pool.rows.push(Allocation {
                id: AllocationId(pool.next_id),
                node_id,
                ip: candidate.ip,
                port: candidate.port,
                ip_alias: candidate.ip_alias,
                server_id: None,
                created_at,
            });
            pool.next_id += 1;
            inserted += 1;
        }

        log::debug!("Committed {} new allocations ({} staged)", inserted, staged);
        Ok(inserted)
    }
}
