use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::db::Compression;
use crate::error::{Result, SolverError};
use crate::memory::Allocator;
use crate::types::{NUM_CHILD_POSITIONS_MAX, NUM_CHILD_TIERS_MAX, NUM_MOVES_MAX, NUM_PARENT_POSITIONS_MAX};

/// Which tier worker solves a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Frontier propagation, retried with direct update when the pool runs
    /// out and the game enumerates parents itself.
    #[default]
    Auto,
    /// Backward induction with per-remoteness frontiers.
    Frontier,
    /// Backward induction that rescans the solving tier in place.
    DirectUpdate,
    /// Checkpointable value iteration.
    ValueIteration,
}

/// Caps on the sizes of adapter outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub moves: usize,
    pub child_positions: usize,
    pub parent_positions: usize,
    pub child_tiers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            moves: NUM_MOVES_MAX,
            child_positions: NUM_CHILD_POSITIONS_MAX,
            parent_positions: NUM_PARENT_POSITIONS_MAX,
            child_tiers: NUM_CHILD_TIERS_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointPolicy {
    pub enabled: bool,
    /// Assumed save cost before the first checkpoint has been timed.
    pub initial_cost_estimate_ms: u64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self { enabled: true, initial_cost_estimate_ms: 1_000 }
    }
}

/// Options for solving and analysing tiers. Loadable from JSON; every field
/// is optional there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub strategy: Strategy,
    /// Recompute tiers that the database already reports as solved.
    pub force: bool,
    /// Check results against a reference database after flushing.
    pub compare: bool,
    /// Pool size for one tier's working set. `None` means unbounded.
    pub memlimit_bytes: Option<usize>,
    /// Worker thread count for the CLI's global pool. `None` uses rayon's default.
    pub threads: Option<usize>,
    pub compression: Compression,
    /// Records per compressed block in tier files.
    pub block_records: usize,
    /// Minimum positions handed to one rayon task.
    pub scan_chunk: usize,
    pub checkpoint: CheckpointPolicy,
    pub limits: Limits,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            force: false,
            compare: false,
            memlimit_bytes: None,
            threads: None,
            compression: Compression::Lz4,
            block_records: 1 << 16,
            scan_chunk: 1024,
            checkpoint: CheckpointPolicy::default(),
            limits: Limits::default(),
        }
    }
}

impl SolveOptions {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SolverError::fs(path, e))?;
        serde_json::from_str(&text).map_err(|e| SolverError::corrupt(path, format!("config parse error: {e}")))
    }

    /// Fresh pool for one tier invocation.
    pub fn allocator(&self) -> Allocator {
        match self.memlimit_bytes {
            Some(limit) => Allocator::new(limit),
            None => Allocator::unbounded(),
        }
    }

    #[inline]
    pub fn min_chunk(&self) -> usize {
        self.scan_chunk.max(1)
    }
}
