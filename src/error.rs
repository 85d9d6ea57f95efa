use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Position, Remoteness, Tier};

pub type Result<T, E = SolverError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("allocator pool exhausted: requested {requested} bytes with {remaining} remaining")]
    OutOfMemory { requested: usize, remaining: usize },

    #[error("file system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt data in {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("{what} exceeded capacity: {len} > {max}")]
    CapacityExceeded { what: &'static str, len: usize, max: usize },

    #[error("remoteness {0} exceeds the supported maximum")]
    RemotenessOverflow(usize),

    #[error("game adapter returned an invalid result for tier {tier} position {position}: {reason}")]
    Adapter { tier: Tier, position: Position, reason: String },

    #[error("illegal tier graph: {0}")]
    TierGraph(String),

    #[error(
        "inconsistent {field} at tier {tier} position {position}: solved {solved}, reference {reference}"
    )]
    Inconsistent {
        tier: Tier,
        position: Position,
        field: &'static str,
        solved: String,
        reference: String,
    },

    #[error("{0}")]
    Runtime(String),
}

impl SolverError {
    pub fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SolverError::FileSystem { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SolverError::Corrupt { path: path.into(), reason: reason.into() }
    }

    pub fn adapter(tier: Tier, position: Position, reason: impl Into<String>) -> Self {
        SolverError::Adapter { tier, position, reason: reason.into() }
    }

    /// Checks a bounded adapter output against its cap.
    pub fn check_capacity(what: &'static str, len: usize, max: usize) -> Result<()> {
        if len > max {
            return Err(SolverError::CapacityExceeded { what, len, max });
        }
        Ok(())
    }

    pub fn check_remoteness(r: usize) -> Result<Remoteness> {
        if r > usize::from(crate::types::REMOTENESS_MAX) {
            return Err(SolverError::RemotenessOverflow(r));
        }
        // Fits: REMOTENESS_MAX < u16::MAX.
        Ok(r as Remoteness)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SolverError::OutOfMemory { .. } => ErrorCode::MallocFailure,
            SolverError::FileSystem { .. } | SolverError::Corrupt { .. } => ErrorCode::FileSystem,
            SolverError::TierGraph(_) => ErrorCode::IllegalGameTierGraph,
            SolverError::CapacityExceeded { .. } | SolverError::Adapter { .. } => ErrorCode::NotReached,
            SolverError::RemotenessOverflow(_)
            | SolverError::Inconsistent { .. }
            | SolverError::Runtime(_) => ErrorCode::Runtime,
        }
    }
}

impl From<bincode::Error> for SolverError {
    fn from(e: bincode::Error) -> Self {
        SolverError::Runtime(format!("bincode error: {e}"))
    }
}

/// Numeric status surfaced to callers such as the CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    NoError = 0,
    MallocFailure = 1,
    NotReached = 3,
    FileSystem = 5,
    IllegalGameTierGraph = 9,
    Runtime = 12,
}

impl ErrorCode {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::NoError,
            Err(e) => e.code(),
        }
    }
}

/// Failures detected by the adapter self-test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestFailure {
    #[error("tier {tier} maps position {position} to an illegal or out-of-range child {child_tier}:{child_position}")]
    IllegalChild { tier: Tier, position: Position, child_tier: Tier, child_position: Position },

    #[error("child {child_tier}:{child_position} of {tier}:{position} does not list it as a parent")]
    ChildParentMismatch { tier: Tier, position: Position, child_tier: Tier, child_position: Position },

    #[error("parent {parent_tier}:{parent_position} of {tier}:{position} does not reach it as a child")]
    ParentChildMismatch { tier: Tier, position: Position, parent_tier: Tier, parent_position: Position },

    #[error("position {position} of canonical tier {tier} does not map to itself")]
    TierSymmetrySelfMapping { tier: Tier, position: Position },

    #[error("position {position} of tier {tier} does not round-trip through symmetric tier {symmetric}")]
    TierSymmetryInconsistent { tier: Tier, position: Position, symmetric: Tier },
}

impl TestFailure {
    pub fn code(&self) -> i32 {
        match self {
            TestFailure::IllegalChild { .. } => 1,
            TestFailure::ChildParentMismatch { .. } => 2,
            TestFailure::ParentChildMismatch { .. } => 3,
            TestFailure::TierSymmetrySelfMapping { .. } => 4,
            TestFailure::TierSymmetryInconsistent { .. } => 5,
        }
    }
}
