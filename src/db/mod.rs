// Database contract used by the tier workers, and the file-backed store.

pub mod array;
pub mod codec;
pub mod record;

pub use array::ArrayDb;
pub use codec::Compression;
pub use record::{Record, RecordArray};

use crate::analysis::Analysis;
use crate::bitset::ConcurrentBitset;
use crate::error::Result;
use crate::memory::Allocator;
use crate::types::{Remoteness, Tier, TierPosition, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierStatus {
    Solved,
    Missing,
    Corrupted,
    /// The status could not be determined, e.g. the file is unreadable.
    CheckError,
}

/// Where a checkpointed solve stopped. Opaque to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointStatus {
    pub step: i32,
    pub remoteness: i32,
}

/// Streaming random access to persisted tiers.
pub trait TierProbe {
    fn record(&mut self, tp: TierPosition) -> Result<Record>;

    fn value(&mut self, tp: TierPosition) -> Result<Value> {
        Ok(self.record(tp)?.value())
    }

    fn remoteness(&mut self, tp: TierPosition) -> Result<Remoteness> {
        Ok(self.record(tp)?.remoteness())
    }
}

pub trait Database: Send + Sync {
    fn tier_status(&self, tier: Tier) -> TierStatus;

    /// Persists a fully solved tier.
    fn flush_solving_tier(&self, records: &RecordArray) -> Result<()>;

    /// Reads a solved tier into memory charged to `allocator`.
    fn load_tier(&self, tier: Tier, size: u64, allocator: &Allocator) -> Result<RecordArray>;

    fn probe(&self) -> Box<dyn TierProbe + Send + '_>;

    fn checkpoint_exists(&self, tier: Tier) -> bool;
    fn checkpoint_save(&self, records: &RecordArray, status: CheckpointStatus) -> Result<()>;
    fn checkpoint_load(&self, tier: Tier, size: u64, allocator: &Allocator) -> Result<(RecordArray, CheckpointStatus)>;
    fn checkpoint_remove(&self, tier: Tier) -> Result<()>;

    fn save_discovery_map(&self, tier: Tier, map: &ConcurrentBitset) -> Result<()>;
    /// `Ok(None)` if no map has been saved for `tier`.
    fn load_discovery_map(&self, tier: Tier, num_bits: usize, allocator: &Allocator) -> Result<Option<ConcurrentBitset>>;

    fn analysis_status(&self, tier: Tier) -> TierStatus;
    fn save_analysis(&self, analysis: &Analysis) -> Result<()>;
    fn load_analysis(&self, tier: Tier) -> Result<Analysis>;
}
