#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // may be revisited
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod types;
pub mod error;
pub mod config;
pub mod concurrency;
pub mod bitset;
pub mod memory;
pub mod game;
pub mod synthetic;
pub mod db;
pub mod analysis;

pub mod solver;

// Re-exports: stable minimal API surface for external callers
pub use crate::analysis::Analysis;
pub use crate::bitset::ConcurrentBitset;
pub use crate::config::{CheckpointPolicy, Limits, SolveOptions, Strategy};
pub use crate::db::{ArrayDb, CheckpointStatus, Compression, Database, Record, RecordArray, TierProbe, TierStatus};
pub use crate::error::{ErrorCode, Result, SolverError, TestFailure};
pub use crate::game::TierGame;
pub use crate::memory::{Allocator, TrackedVec};
pub use crate::solver::{analyze_all, analyze_tier, discover_tier, solve_all, solve_tier, test_all};
pub use crate::synthetic::{RandomGameParams, SyntheticBuilder, SyntheticGame};
pub use crate::types::{outcome_compare, Move, Position, Remoteness, Tier, TierPosition, Value, REMOTENESS_MAX};
