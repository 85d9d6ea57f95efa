use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{Result, SolverError};
use crate::memory::{Allocator, Reservation};
use crate::types::{outcome_compare, Position, Remoteness, Tier, Value, REMOTENESS_MAX};

const REMOTENESS_BITS: u32 = 12;
const REMOTENESS_MASK: u16 = (1 << REMOTENESS_BITS) - 1;

/// Packed `(value, remoteness)`: value in the high 4 bits, remoteness in the low 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Record(u16);

impl Record {
    pub const UNDECIDED: Record = Record(0);

    #[inline]
    pub fn new(value: Value, remoteness: Remoteness) -> Self {
        debug_assert!(remoteness <= REMOTENESS_MAX);
        Record((u16::from(value.bits()) << REMOTENESS_BITS) | (remoteness & REMOTENESS_MASK))
    }

    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        Record(raw)
    }

    #[inline]
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Value bits outside the known range read back as Undecided.
    #[inline]
    pub fn value(self) -> Value {
        Value::from_bits((self.0 >> REMOTENESS_BITS) as u8).unwrap_or(Value::Undecided)
    }

    #[inline]
    pub fn remoteness(self) -> Remoteness {
        self.0 & REMOTENESS_MASK
    }

    #[inline]
    pub fn outcome(self) -> (Value, Remoteness) {
        (self.value(), self.remoteness())
    }
}

/// In-memory records of one tier, updatable from many threads.
///
/// This is the "solving tier" while a worker runs and also the read-only form
/// of a loaded tier.
#[derive(Debug)]
pub struct RecordArray {
    tier: Tier,
    records: Box<[AtomicU16]>,
    _reservation: Reservation,
}

impl RecordArray {
    /// All-Undecided records for `size` positions.
    pub fn new(tier: Tier, size: u64, allocator: &Allocator) -> Result<Self> {
        let len = usize::try_from(size)
            .map_err(|_| SolverError::Runtime(format!("tier {tier} size {size} does not fit in memory")))?;
        let (records, reservation) = allocator.alloc_with(len, || AtomicU16::new(0))?;
        Ok(Self { tier, records: records.into_boxed_slice(), _reservation: reservation })
    }

    /// Bytes needed for a tier of `size` positions.
    #[inline]
    pub fn memory_usage(size: u64) -> usize {
        usize::try_from(size).unwrap_or(usize::MAX).saturating_mul(std::mem::size_of::<AtomicU16>())
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.records.len() as u64
    }

    #[inline]
    fn slot(&self, position: Position) -> &AtomicU16 {
        &self.records[position as usize]
    }

    #[inline]
    pub fn get(&self, position: Position) -> Record {
        Record(self.slot(position).load(Ordering::Relaxed))
    }

    #[inline]
    pub fn value(&self, position: Position) -> Value {
        self.get(position).value()
    }

    #[inline]
    pub fn remoteness(&self, position: Position) -> Remoteness {
        self.get(position).remoteness()
    }

    #[inline]
    pub fn set(&self, position: Position, record: Record) {
        self.slot(position).store(record.0, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_value_remoteness(&self, position: Position, value: Value, remoteness: Remoteness) {
        self.set(position, Record::new(value, remoteness));
    }

    /// Replaces the value and keeps the stored remoteness.
    #[inline]
    pub fn set_value(&self, position: Position, value: Value) {
        let _ = self.slot(position).fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
            Some(Record::new(value, Record(raw).remoteness()).0)
        });
    }

    /// Replaces the remoteness and keeps the stored value.
    #[inline]
    pub fn set_remoteness(&self, position: Position, remoteness: Remoteness) {
        let _ = self.slot(position).fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
            Some(Record::new(Record(raw).value(), remoteness).0)
        });
    }

    /// Stores `(value, remoteness)` if it beats the current record under
    /// `outcome_compare`. Returns true if the record changed.
    #[inline]
    pub fn maximize(&self, position: Position, value: Value, remoteness: Remoteness) -> bool {
        let candidate = Record::new(value, remoteness);
        self.slot(position)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |raw| {
                if outcome_compare(candidate.outcome(), Record(raw).outcome()).is_gt() {
                    Some(candidate.0)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Little-endian image of every record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.records.len() * 2);
        for r in self.records.iter() {
            out.extend_from_slice(&r.load(Ordering::Relaxed).to_le_bytes());
        }
        out
    }

    /// Overwrites records `[start, start + bytes.len() / 2)` from a little-endian image.
    pub fn fill_from_bytes(&mut self, start: usize, bytes: &[u8]) -> Result<()> {
        let count = bytes.len() / 2;
        if bytes.len() % 2 != 0 || start.checked_add(count).map_or(true, |end| end > self.records.len()) {
            return Err(SolverError::Runtime(format!(
                "record image of {} bytes at {start} does not fit tier {} of size {}",
                bytes.len(),
                self.tier,
                self.records.len()
            )));
        }
        for (slot, pair) in self.records[start..start + count].iter_mut().zip(bytes.chunks_exact(2)) {
            *slot.get_mut() = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(())
    }
}
