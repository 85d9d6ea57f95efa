// Per-remoteness queues of positions whose outcome is known but not yet
// pushed to their parents.
//
// Positions do not carry their tier. Each bucket instead keeps one divider
// per source tier index, filled in index order: while loading, a divider
// counts the positions added for that index; `accumulate_dividers` turns the
// counts into prefix sums so that entry `i` of a bucket came from the first
// index `k` with `i < dividers[k]`. After accumulation only the last index
// (the tier being solved) may still receive positions.

use crate::error::{Result, SolverError};
use crate::memory::{Allocator, TrackedVec};
use crate::types::{Position, Remoteness, NUM_REMOTENESSES};

#[derive(Debug)]
struct Bucket {
    positions: TrackedVec<Position>,
    dividers: TrackedVec<u64>,
}

#[derive(Debug)]
pub struct Frontier {
    num_dividers: usize,
    buckets: Vec<Bucket>,
    accumulated: bool,
}

impl Frontier {
    /// `num_dividers` is the number of source tiers, the tier being solved included.
    pub fn new(num_dividers: usize, allocator: &Allocator) -> Self {
        let buckets = (0..NUM_REMOTENESSES)
            .map(|_| Bucket { positions: TrackedVec::new(allocator), dividers: TrackedVec::new(allocator) })
            .collect();
        Self { num_dividers: num_dividers.max(1), buckets, accumulated: false }
    }

    #[inline]
    pub fn num_dividers(&self) -> usize {
        self.num_dividers
    }

    pub fn add(&mut self, position: Position, remoteness: Remoteness, child_index: usize) -> Result<()> {
        let last = self.num_dividers - 1;
        if child_index > last {
            return Err(SolverError::Runtime(format!(
                "frontier divider index {child_index} out of range {}",
                self.num_dividers
            )));
        }
        if self.accumulated && child_index != last {
            return Err(SolverError::Runtime(format!(
                "frontier dividers already accumulated; cannot add to index {child_index}"
            )));
        }
        let bucket = self
            .buckets
            .get_mut(usize::from(remoteness))
            .ok_or(SolverError::RemotenessOverflow(usize::from(remoteness)))?;
        if bucket.dividers.is_empty() {
            bucket.dividers.extend_from_slice(&vec![0; self.num_dividers])?;
        }
        bucket.positions.push(position)?;
        bucket.dividers.as_mut_slice()[child_index] += 1;
        Ok(())
    }

    /// Converts divider counts to prefix sums. Idempotent.
    pub fn accumulate_dividers(&mut self) {
        if self.accumulated {
            return;
        }
        for bucket in &mut self.buckets {
            let mut running = 0u64;
            for d in bucket.dividers.as_mut_slice() {
                running += *d;
                *d = running;
            }
        }
        self.accumulated = true;
    }

    #[inline]
    pub fn len(&self, remoteness: Remoteness) -> usize {
        self.buckets.get(usize::from(remoteness)).map_or(0, |b| b.positions.len())
    }

    #[inline]
    pub fn is_empty(&self, remoteness: Remoteness) -> bool {
        self.len(remoteness) == 0
    }

    #[inline]
    pub fn get(&self, remoteness: Remoteness, i: usize) -> Position {
        self.buckets[usize::from(remoteness)].positions[i]
    }

    /// Source tier index of entry `i` in bucket `remoteness`. Dividers must be accumulated.
    pub fn child_index_of(&self, remoteness: Remoteness, i: usize) -> usize {
        debug_assert!(self.accumulated);
        let dividers = &self.buckets[usize::from(remoteness)].dividers;
        dividers.partition_point(|&end| end <= i as u64)
    }

    /// Contiguous runs of bucket `remoteness`, one per non-empty source tier index.
    pub fn segments(&self, remoteness: Remoteness) -> Vec<(usize, &[Position])> {
        debug_assert!(self.accumulated);
        let Some(bucket) = self.buckets.get(usize::from(remoteness)) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut start = 0usize;
        for (index, &end) in bucket.dividers.iter().enumerate() {
            let end = end as usize;
            if end > start {
                out.push((index, &bucket.positions[start..end]));
            }
            start = end;
        }
        out
    }

    /// Drops bucket `remoteness` and returns its memory to the pool.
    pub fn free_remoteness(&mut self, remoteness: Remoteness) {
        if let Some(bucket) = self.buckets.get_mut(usize::from(remoteness)) {
            bucket.positions.release();
            bucket.dividers.release();
        }
    }
}
