use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;
use crate::memory::{Allocator, Reservation};
use crate::types::Position;

/// Per-position count of children that have not yet proven the position lost.
///
/// `ILLEGAL` marks positions the solver never decides through propagation
/// (illegal, non-canonical, and in some workers primitive). Neither
/// `decrement_if_nonzero` nor `take` ever modifies such a slot, and no
/// operation ever moves a counter below zero.
#[derive(Debug)]
pub struct ChildCounters {
    counts: Box<[AtomicU32]>,
    _reservation: Reservation,
}

impl ChildCounters {
    pub const ILLEGAL: u32 = u32::MAX;

    pub fn new(size: u64, allocator: &Allocator) -> Result<Self> {
        let (counts, reservation) = allocator.alloc_with(size as usize, || AtomicU32::new(0))?;
        Ok(Self { counts: counts.into_boxed_slice(), _reservation: reservation })
    }

    pub fn memory_usage(size: u64) -> usize {
        (size as usize).saturating_mul(std::mem::size_of::<AtomicU32>())
    }

    #[inline]
    fn slot(&self, position: Position) -> &AtomicU32 {
        &self.counts[position as usize]
    }

    #[inline]
    pub fn get(&self, position: Position) -> u32 {
        self.slot(position).load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, position: Position, count: u32) {
        self.slot(position).store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn mark_illegal(&self, position: Position) {
        self.set(position, Self::ILLEGAL);
    }

    #[inline]
    pub fn is_illegal(&self, position: Position) -> bool {
        self.get(position) == Self::ILLEGAL
    }

    /// True while the position still waits on undecided children.
    #[inline]
    pub fn is_pending(&self, position: Position) -> bool {
        let c = self.get(position);
        c != 0 && c != Self::ILLEGAL
    }

    /// Decrements the counter unless it is zero or `ILLEGAL` and returns the
    /// value it held before. Concurrent callers each observe a distinct
    /// previous value, so exactly one of them sees `1`.
    #[inline]
    pub fn decrement_if_nonzero(&self, position: Position) -> u32 {
        self.slot(position)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c == 0 || c == Self::ILLEGAL {
                    None
                } else {
                    Some(c - 1)
                }
            })
            .unwrap_or(0)
    }

    /// Fetch-and-zero. Returns the previous count, or 0 for `ILLEGAL` slots,
    /// which are left untouched.
    #[inline]
    pub fn take(&self, position: Position) -> u32 {
        self.slot(position)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                if c == 0 || c == Self::ILLEGAL {
                    None
                } else {
                    Some(0)
                }
            })
            .unwrap_or(0)
    }
}
