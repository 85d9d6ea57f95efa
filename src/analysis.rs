use serde::{Deserialize, Serialize};

use crate::types::{Remoteness, Tier, Value};

/// Statistics over the reachable positions of one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub tier: Tier,
    pub tier_size: u64,
    /// Canonical positions discovered from the initial position.
    pub reachable: u64,
    /// Reachable positions per value, indexed by `Value as usize`.
    pub value_counts: [u64; 5],
    /// Largest remoteness seen per value, indexed by `Value as usize`.
    pub max_remoteness: [Remoteness; 5],
    pub total_moves: u64,
    pub max_moves: u64,
    /// Discovery sweeps over the tier.
    pub sweeps: u32,
    /// Sweeps that had to fall back to the bitset fringe.
    pub fallback_sweeps: u32,
}

impl Analysis {
    pub fn new(tier: Tier, tier_size: u64) -> Self {
        Self { tier, tier_size, ..Self::default() }
    }

    pub fn count(&mut self, value: Value, remoteness: Remoteness, moves: usize) {
        let v = value as usize;
        self.reachable += 1;
        self.value_counts[v] += 1;
        self.max_remoteness[v] = self.max_remoteness[v].max(remoteness);
        self.total_moves += moves as u64;
        self.max_moves = self.max_moves.max(moves as u64);
    }

    /// Folds in counts gathered by another worker over disjoint positions.
    pub fn merge(&mut self, other: &Analysis) {
        self.reachable += other.reachable;
        for v in 0..5 {
            self.value_counts[v] += other.value_counts[v];
            self.max_remoteness[v] = self.max_remoteness[v].max(other.max_remoteness[v]);
        }
        self.total_moves += other.total_moves;
        self.max_moves = self.max_moves.max(other.max_moves);
    }

    #[inline]
    pub fn count_of(&self, value: Value) -> u64 {
        self.value_counts[value as usize]
    }

    pub fn average_moves(&self) -> f64 {
        if self.reachable == 0 {
            0.0
        } else {
            self.total_moves as f64 / self.reachable as f64
        }
    }
}
