// Child-to-parent adjacency for games that cannot enumerate parents.
//
// Every position of every tier a parent can move into gets a slot: the tiers
// are laid out back to back through an offset map, and the parents of slot
// `s` are `parents[starts[s]..starts[s + 1]]` (compressed sparse rows).

use crate::error::{Result, SolverError};
use crate::memory::{Allocator, Reservation, TrackedVec};
use crate::solver::FastMap;
use crate::types::{Position, Tier, TierPosition};

/// `(child, parent)` pairs gathered by one worker.
pub type EdgeList = TrackedVec<(TierPosition, Position)>;

#[derive(Debug)]
pub struct ReverseGraph {
    offsets: FastMap<Tier, (u64, u64)>,
    starts: Vec<u64>,
    parents: Vec<Position>,
    _reservations: [Reservation; 2],
}

impl ReverseGraph {
    /// Bytes for `slots` children and `edges` parent entries.
    pub fn memory_usage(slots: u64, edges: u64) -> usize {
        ((slots + 1) as usize + edges as usize).saturating_mul(std::mem::size_of::<u64>())
    }

    /// Peak bytes while building: the graph plus one write cursor per slot.
    pub fn build_usage(slots: u64, edges: u64) -> usize {
        Self::memory_usage(slots, edges).saturating_add(((slots + 1) as usize).saturating_mul(std::mem::size_of::<u64>()))
    }

    /// Builds the graph over `tiers` (tier id and size) from edge lists.
    /// Parents of one child keep the order in which the lists were given.
    pub fn build(tiers: &[(Tier, u64)], edges: &[EdgeList], allocator: &Allocator) -> Result<Self> {
        let mut offsets: FastMap<Tier, (u64, u64)> = FastMap::default();
        let mut total = 0u64;
        for &(tier, size) in tiers {
            if offsets.insert(tier, (total, size)).is_none() {
                total += size;
            }
        }
        let num_edges: usize = edges.iter().map(|list| list.len()).sum();

        let slot_of = |child: TierPosition| -> Result<usize> {
            match offsets.get(&child.tier) {
                Some(&(base, size)) if child.position < size => Ok((base + child.position) as usize),
                _ => Err(SolverError::adapter(
                    child.tier,
                    child.position,
                    "child position is outside the tiers reachable from the solving tier",
                )),
            }
        };

        let (mut starts, starts_res) = allocator.alloc_with(total as usize + 1, || 0u64)?;
        for list in edges {
            for &(child, _) in list.iter() {
                starts[slot_of(child)? + 1] += 1;
            }
        }
        for i in 1..starts.len() {
            starts[i] += starts[i - 1];
        }

        let (mut parents, parents_res) = allocator.alloc_with(num_edges, || 0 as Position)?;
        // Write cursor per slot, starting at the slot's offset. Charged to
        // the pool like `starts` until the scatter is done.
        let (mut cursor, cursor_res) = allocator.alloc_with(starts.len(), || 0u64)?;
        cursor.copy_from_slice(&starts);
        for list in edges {
            for &(child, parent) in list.iter() {
                let slot = slot_of(child)?;
                parents[cursor[slot] as usize] = parent;
                cursor[slot] += 1;
            }
        }
        drop(cursor);
        drop(cursor_res);

        Ok(Self { offsets, starts, parents, _reservations: [starts_res, parents_res] })
    }

    /// Parents of `child`, empty for children outside the mapped tiers.
    pub fn parents_of(&self, child: TierPosition) -> &[Position] {
        match self.offsets.get(&child.tier) {
            Some(&(base, size)) if child.position < size => {
                let slot = (base + child.position) as usize;
                &self.parents[self.starts[slot] as usize..self.starts[slot + 1] as usize]
            }
            _ => &[],
        }
    }

    pub fn num_edges(&self) -> usize {
        self.parents.len()
    }
}
