use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SolverError};
use crate::memory::{Allocator, Reservation};

const BITS_PER_BLOCK: usize = u64::BITS as usize;
const BYTES_PER_BLOCK: usize = BITS_PER_BLOCK / 8;

/// Fixed-length bit vector with per-bit atomic updates.
///
/// `set`, `reset` and `test` may be called from any number of threads at
/// once. `reset_all` and cloning take `&mut self`/`&self` without any
/// synchronisation of their own and must not overlap concurrent writers.
#[derive(Debug)]
pub struct ConcurrentBitset {
    num_bits: usize,
    blocks: Box<[AtomicU64]>,
    _reservation: Option<Reservation>,
}

impl ConcurrentBitset {
    /// Creates an all-zero bitset outside of any pool.
    pub fn new(num_bits: usize) -> Self {
        let blocks = (0..num_blocks(num_bits)).map(|_| AtomicU64::new(0)).collect();
        Self { num_bits, blocks, _reservation: None }
    }

    /// Creates an all-zero bitset charged to `allocator`.
    pub fn new_in(num_bits: usize, allocator: &Allocator) -> Result<Self> {
        let (blocks, reservation) = allocator.alloc_with(num_blocks(num_bits), || AtomicU64::new(0))?;
        Ok(Self { num_bits, blocks: blocks.into_boxed_slice(), _reservation: Some(reservation) })
    }

    /// Bytes needed to hold `num_bits` bits.
    #[inline]
    pub fn memory_usage(num_bits: usize) -> usize {
        num_blocks(num_bits) * BYTES_PER_BLOCK
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    #[inline]
    fn locate(&self, i: usize) -> (&AtomicU64, u64) {
        debug_assert!(i < self.num_bits, "bit {i} out of range {}", self.num_bits);
        (&self.blocks[i / BITS_PER_BLOCK], 1u64 << (i % BITS_PER_BLOCK))
    }

    /// Sets bit `i` and returns its previous state.
    #[inline]
    pub fn set(&self, i: usize, order: Ordering) -> bool {
        let (block, mask) = self.locate(i);
        block.fetch_or(mask, order) & mask != 0
    }

    /// Clears bit `i` and returns its previous state.
    #[inline]
    pub fn reset(&self, i: usize, order: Ordering) -> bool {
        let (block, mask) = self.locate(i);
        block.fetch_and(!mask, order) & mask != 0
    }

    #[inline]
    pub fn test(&self, i: usize, order: Ordering) -> bool {
        let (block, mask) = self.locate(i);
        block.load(order) & mask != 0
    }

    pub fn reset_all(&mut self) {
        for block in self.blocks.iter_mut() {
            *block.get_mut() = 0;
        }
    }

    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.load(Ordering::Relaxed).count_ones() as usize).sum()
    }

    /// Indices of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().enumerate().flat_map(|(bi, block)| {
            let mut word = block.load(Ordering::Relaxed);
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let tz = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(bi * BITS_PER_BLOCK + tz)
            })
        })
    }

    /// Little-endian byte image of the blocks.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.len() * BYTES_PER_BLOCK);
        for block in self.blocks.iter() {
            out.extend_from_slice(&block.load(Ordering::Relaxed).to_le_bytes());
        }
        out
    }

    /// Overwrites every bit from a byte image produced by `serialize` on a
    /// bitset of the same length.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.blocks.len() * BYTES_PER_BLOCK {
            return Err(SolverError::Runtime(format!(
                "bitset image is {} bytes, expected {}",
                bytes.len(),
                self.blocks.len() * BYTES_PER_BLOCK
            )));
        }
        for (block, chunk) in self.blocks.iter_mut().zip(bytes.chunks_exact(BYTES_PER_BLOCK)) {
            let mut word = [0u8; BYTES_PER_BLOCK];
            word.copy_from_slice(chunk);
            *block.get_mut() = u64::from_le_bytes(word);
        }
        Ok(())
    }
}

impl Clone for ConcurrentBitset {
    /// The copy is not charged to any pool.
    fn clone(&self) -> Self {
        let blocks = self.blocks.iter().map(|b| AtomicU64::new(b.load(Ordering::Relaxed))).collect();
        Self { num_bits: self.num_bits, blocks, _reservation: None }
    }
}

#[inline]
fn num_blocks(num_bits: usize) -> usize {
    num_bits.div_ceil(BITS_PER_BLOCK)
}
