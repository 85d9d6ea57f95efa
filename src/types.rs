use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque tier identifier.
pub type Tier = u64;
/// Dense index of a position inside its tier, in `[0, tier_size)`.
pub type Position = u64;
/// Game-defined move encoding. Only ever handed back to the same game.
pub type Move = u64;
/// Moves to the terminal outcome under optimal play.
pub type Remoteness = u16;

/// Largest remoteness a record can hold.
pub const REMOTENESS_MAX: Remoteness = 1023;
/// Number of distinct remoteness values, i.e. frontier bucket count.
pub const NUM_REMOTENESSES: usize = REMOTENESS_MAX as usize + 1;

// Soft caps on adapter output sizes. Overflow is reported as
// `SolverError::CapacityExceeded` rather than trusted.
pub const NUM_MOVES_MAX: usize = 4096;
pub const NUM_CHILD_POSITIONS_MAX: usize = 4096;
pub const NUM_PARENT_POSITIONS_MAX: usize = 4096;
pub const NUM_CHILD_TIERS_MAX: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TierPosition {
    pub tier: Tier,
    pub position: Position,
}

impl TierPosition {
    #[inline]
    pub const fn new(tier: Tier, position: Position) -> Self {
        Self { tier, position }
    }
}

impl fmt::Display for TierPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.position)
    }
}

/// Game-theoretic value. The discriminant order is load-bearing:
/// `Undecided < Lose < Draw < Tie < Win`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Value {
    #[default]
    Undecided = 0,
    Lose = 1,
    Draw = 2,
    Tie = 3,
    Win = 4,
}

impl Value {
    pub const ALL: [Value; 5] = [Value::Undecided, Value::Lose, Value::Draw, Value::Tie, Value::Win];

    #[inline]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Value::Undecided),
            1 => Some(Value::Lose),
            2 => Some(Value::Draw),
            3 => Some(Value::Tie),
            4 => Some(Value::Win),
            _ => None,
        }
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_decided(self) -> bool {
        self != Value::Undecided
    }

    /// Short label used by the CLI and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Value::Undecided => "undecided",
            Value::Lose => "lose",
            Value::Draw => "draw",
            Value::Tie => "tie",
            Value::Win => "win",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total order over `(value, remoteness)` from the point of view of the
/// player to move: a greater outcome is preferred.
///
/// Values compare by their numeric order. Between equal values, a Lose is
/// better the longer it takes, while a Win or Tie is better the sooner it
/// arrives. Remoteness is irrelevant for Undecided and Draw.
pub fn outcome_compare(a: (Value, Remoteness), b: (Value, Remoteness)) -> Ordering {
    match a.0.cmp(&b.0) {
        Ordering::Equal => match a.0 {
            Value::Lose => a.1.cmp(&b.1),
            Value::Win | Value::Tie => b.1.cmp(&a.1),
            Value::Undecided | Value::Draw => Ordering::Equal,
        },
        other => other,
    }
}

/// Outcome of a parent given the outcome of one of its children.
/// Returns `None` for children that do not constrain the parent on their own.
#[inline]
pub fn parent_outcome(child: Value) -> Option<Value> {
    match child {
        Value::Lose => Some(Value::Win),
        Value::Win => Some(Value::Lose),
        Value::Tie => Some(Value::Tie),
        Value::Draw => Some(Value::Draw),
        Value::Undecided => None,
    }
}
