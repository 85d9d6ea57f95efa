use rayon::prelude::*;

use crate::db::{Database, RecordArray};
use crate::error::{Result, SolverError};
use crate::solver::positions;
use crate::types::{TierPosition, Value};

/// Checks a freshly solved tier against `reference`. Positions the reference
/// leaves undecided are skipped. Any other position whose value or remoteness
/// differs is reported as an error.
pub fn compare_tier(records: &RecordArray, reference: &dyn Database, min_chunk: usize) -> Result<()> {
    let tier = records.tier();
    positions(records.size(), min_chunk).try_for_each_init(
        || reference.probe(),
        |probe, pos| {
            let solved = records.get(pos);
            let expected = probe.record(TierPosition::new(tier, pos))?;
            if expected.value() == Value::Undecided {
                return Ok(());
            }
            if solved.value() != expected.value() {
                return Err(SolverError::Inconsistent {
                    tier,
                    position: pos,
                    field: "value",
                    solved: solved.value().to_string(),
                    reference: expected.value().to_string(),
                });
            }
            if solved.remoteness() != expected.remoteness() {
                return Err(SolverError::Inconsistent {
                    tier,
                    position: pos,
                    field: "remoteness",
                    solved: solved.remoteness().to_string(),
                    reference: expected.remoteness().to_string(),
                });
            }
            Ok(())
        },
    )
}
