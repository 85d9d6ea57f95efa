// Atomic cells shared by the solver workers.
//
// One implementation serves single- and multi-threaded runs alike; a rayon
// pool of one thread simply never contends.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ConcurrentBool(AtomicBool);

impl ConcurrentBool {
    #[inline]
    pub const fn new(v: bool) -> Self {
        Self(AtomicBool::new(v))
    }

    #[inline]
    pub fn load(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, v: bool) {
        self.0.store(v, Ordering::Release);
    }

    /// Sets the flag and returns its previous state.
    #[inline]
    pub fn set(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug, Default)]
pub struct ConcurrentInt(AtomicI64);

impl ConcurrentInt {
    #[inline]
    pub const fn new(v: i64) -> Self {
        Self(AtomicI64::new(v))
    }

    #[inline]
    pub fn load(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    /// Raises the stored value to `v` if it is larger. Returns true if it changed.
    #[inline]
    pub fn maximize(&self, v: i64) -> bool {
        self.0.fetch_max(v, Ordering::Relaxed) < v
    }
}

#[derive(Debug, Default)]
pub struct ConcurrentSize(AtomicUsize);

impl ConcurrentSize {
    #[inline]
    pub const fn new(v: usize) -> Self {
        Self(AtomicUsize::new(v))
    }

    #[inline]
    pub fn load(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, v: usize) {
        self.0.store(v, Ordering::Release);
    }

    #[inline]
    pub fn add(&self, v: usize) -> usize {
        self.0.fetch_add(v, Ordering::AcqRel)
    }

    /// Subtracts `v` only if the current value is at least `v`.
    /// Returns the previous value on success and `None` when it would underflow.
    #[inline]
    pub fn sub_if_ge(&self, v: usize) -> Option<usize> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| cur.checked_sub(v))
            .ok()
    }
}

/// Number of worker threads in the current rayon pool.
#[inline]
pub fn num_threads() -> usize {
    rayon::current_num_threads().max(1)
}

