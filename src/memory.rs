// Bounded allocation pool shared by every structure of one solve.
//
// The pool is a byte budget, not an arena: memory still comes from the
// global heap, but every allocation that goes through an `Allocator` first
// reserves its size and gives it back when the owning `Reservation` drops.
// Running out of budget is an ordinary `SolverError::OutOfMemory`.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use crate::concurrency::ConcurrentSize;
use crate::error::{Result, SolverError};

#[derive(Debug)]
struct Pool {
    limit: usize,
    remaining: ConcurrentSize,
}

/// Shared handle to a memory pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Allocator {
    pool: Arc<Pool>,
}

impl Allocator {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            pool: Arc::new(Pool { limit: limit_bytes, remaining: ConcurrentSize::new(limit_bytes) }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.pool.limit
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.pool.remaining.load()
    }

    #[inline]
    pub fn in_use(&self) -> usize {
        self.pool.limit - self.remaining()
    }

    pub fn reserve(&self, bytes: usize) -> Result<Reservation> {
        self.take(bytes)?;
        Ok(Reservation { allocator: self.clone(), bytes })
    }

    fn take(&self, bytes: usize) -> Result<()> {
        match self.pool.remaining.sub_if_ge(bytes) {
            Some(_) => Ok(()),
            None => Err(SolverError::OutOfMemory { requested: bytes, remaining: self.remaining() }),
        }
    }

    fn give_back(&self, bytes: usize) {
        self.pool.remaining.add(bytes);
    }

    /// Allocates `len` elements produced by `fill`, charged to this pool.
    /// Heap exhaustion is reported the same way as pool exhaustion.
    pub fn alloc_with<T>(&self, len: usize, fill: impl FnMut() -> T) -> Result<(Vec<T>, Reservation)> {
        let bytes = bytes_for::<T>(len)?;
        let reservation = self.reserve(bytes)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SolverError::OutOfMemory { requested: bytes, remaining: self.remaining() })?;
        data.resize_with(len, fill);
        Ok((data, reservation))
    }
}

fn bytes_for<T>(len: usize) -> Result<usize> {
    len.checked_mul(size_of::<T>())
        .ok_or(SolverError::OutOfMemory { requested: usize::MAX, remaining: 0 })
}

/// A slice of pool budget. Returned to the pool on drop.
pub struct Reservation {
    allocator: Allocator,
    bytes: usize,
}

impl Reservation {
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn grow(&mut self, extra: usize) -> Result<()> {
        self.allocator.take(extra)?;
        self.bytes += extra;
        Ok(())
    }

    pub fn shrink_to(&mut self, bytes: usize) {
        if bytes < self.bytes {
            self.allocator.give_back(self.bytes - bytes);
            self.bytes = bytes;
        }
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("bytes", &self.bytes).finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.allocator.give_back(self.bytes);
    }
}

/// Growable array whose capacity is charged to an `Allocator`.
#[derive(Debug)]
pub struct TrackedVec<T> {
    data: Vec<T>,
    reservation: Reservation,
}

impl<T> TrackedVec<T> {
    pub fn new(allocator: &Allocator) -> Self {
        // Zero-byte reservations cannot fail.
        Self { data: Vec::new(), reservation: Reservation { allocator: allocator.clone(), bytes: 0 } }
    }

    pub fn with_capacity(allocator: &Allocator, capacity: usize) -> Result<Self> {
        let mut v = Self::new(allocator);
        v.reserve(capacity)?;
        Ok(v)
    }

    /// Makes room for `additional` more elements, doubling like `Vec`.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.data.len().saturating_add(additional);
        if needed <= self.data.capacity() {
            return Ok(());
        }
        let target = needed.max(self.data.capacity().saturating_mul(2)).max(4);
        let extra_bytes = bytes_for::<T>(target - self.data.capacity())?;
        self.reservation.grow(extra_bytes)?;
        if self.data.try_reserve_exact(target - self.data.len()).is_err() {
            self.reservation.shrink_to(self.reservation.bytes() - extra_bytes);
            return Err(SolverError::OutOfMemory {
                requested: extra_bytes,
                remaining: self.reservation.allocator.remaining(),
            });
        }
        Ok(())
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        self.reserve(1)?;
        self.data.push(value);
        Ok(())
    }

    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.reserve(values.len())?;
        self.data.extend_from_slice(values);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Releases both the elements and their budget.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.reservation.shrink_to(0);
    }
}

impl<T> std::ops::Deref for TrackedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}
