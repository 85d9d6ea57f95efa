// Tier workers and the machinery they share.
//
// Each worker solves exactly one tier per call: it reads child tiers through
// the `Database`, asks the game for moves and parents, and flushes the tier
// only after every step succeeded. All per-call state lives in a context
// value owned by the call, so nothing outlives a failed solve.

use std::borrow::Cow;
use std::hash::BuildHasherDefault;

use hashbrown::HashMap as HbHashMap;
use log::{info, warn};
use rayon::prelude::*;

use crate::config::{SolveOptions, Strategy};
use crate::db::{Database, RecordArray, TierStatus};
use crate::error::{Result, SolverError};
use crate::game::{Checked, TierGame};
use crate::types::{parent_outcome, Position, Remoteness, Tier, TierPosition, Value};

pub mod analyzer;
pub mod compare;
pub mod counters;
pub mod frontier;
pub mod frontierless;
pub mod manager;
pub mod percolation;
pub mod reverse_graph;
pub mod selftest;
pub mod value_iteration;

pub use analyzer::{analyze_tier, discover_tier, Discovery};
pub use counters::ChildCounters;
pub use frontier::Frontier;
pub use manager::{analyze_all, build_tier_graph, solve_all, test_all, RunReport, TierGraph};
pub use reverse_graph::ReverseGraph;
pub use value_iteration::{Step, ValueIteration};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
pub(crate) type FastMap<K, V> = HbHashMap<K, V, FastHasher>;

/// Solves `tier` with `options.strategy`. Returns `true` if the tier was
/// computed and flushed, `false` if it was already solved and `force` is off.
///
/// When `options.compare` is set, `reference` must be given; the flushed tier
/// is checked against it position by position.
pub fn solve_tier<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    tier: Tier,
    options: &SolveOptions,
    reference: Option<&dyn Database>,
) -> Result<bool> {
    match options.strategy {
        Strategy::Auto => {
            match percolation::solve(game, db, tier, options, reference) {
                Err(SolverError::OutOfMemory { requested, remaining }) if game.has_parent_positions() => {
                    warn!(
                        "[bi] tier {tier}: frontier propagation ran out of memory \
                         ({requested} bytes requested, {remaining} left); retrying with direct update"
                    );
                    frontierless::solve(game, db, tier, options, reference)
                }
                other => other,
            }
        }
        Strategy::Frontier => percolation::solve(game, db, tier, options, reference),
        Strategy::DirectUpdate => frontierless::solve(game, db, tier, options, reference),
        Strategy::ValueIteration => value_iteration::solve(game, db, tier, options, reference),
    }
}

/// True if `tier` is solved and may be left alone.
pub(crate) fn skip_solved(db: &dyn Database, tier: Tier, options: &SolveOptions, tag: &str) -> bool {
    if !options.force && db.tier_status(tier) == TierStatus::Solved {
        info!("[{tag}] tier {tier} already solved, skipping");
        return true;
    }
    false
}

/// Persists a finished tier and, if requested, checks it against `reference`.
pub(crate) fn save_and_compare(
    db: &dyn Database,
    records: &RecordArray,
    options: &SolveOptions,
    reference: Option<&dyn Database>,
    tag: &str,
) -> Result<()> {
    db.flush_solving_tier(records)?;
    if options.compare {
        let reference = reference
            .ok_or_else(|| SolverError::Runtime("compare requested without a reference database".into()))?;
        compare::compare_tier(records, reference, options.min_chunk())?;
        info!("[{tag}] tier {} matches the reference database", records.tier());
    }
    Ok(())
}

/// Parallel iterator over every position of a tier.
pub(crate) fn positions(size: u64, min_len: usize) -> impl IndexedParallelIterator<Item = Position> {
    (0..size as usize).into_par_iter().with_min_len(min_len).map(|p| p as Position)
}

/// Outcome a parent is forced into by one child, one move further away.
pub(crate) fn deduce_parent(child: Value, remoteness: Remoteness) -> Result<Option<(Value, Remoteness)>> {
    match parent_outcome(child) {
        None => Ok(None),
        Some(Value::Draw) => Ok(Some((Value::Draw, 0))),
        Some(parent) => Ok(Some((parent, SolverError::check_remoteness(usize::from(remoteness) + 1)?))),
    }
}

/// Where the records of a child tier live. Non-canonical tiers are stored
/// under their canonical tier.
pub(crate) fn stored_position<G: TierGame + ?Sized>(game: &G, tp: TierPosition) -> TierPosition {
    let canonical = game.canonical_tier(tp.tier);
    if canonical == tp.tier {
        return tp;
    }
    let mapped = TierPosition::new(canonical, game.position_in_symmetric_tier(tp, canonical));
    TierPosition::new(canonical, game.canonical_position(mapped))
}

/// The solving tier and the tiers its positions move into.
#[derive(Debug)]
pub(crate) struct TierLayout {
    pub tier: Tier,
    pub size: u64,
    /// Distinct child tiers other than `tier`, as the game names them.
    pub children: Vec<Tier>,
    sizes: FastMap<Tier, u64>,
}

impl TierLayout {
    pub fn new<G: TierGame + ?Sized>(game: &Checked<'_, G>, tier: Tier) -> Result<Self> {
        let children = game.distinct_child_tiers(tier)?;
        let size = game.game.tier_size(tier);
        let mut sizes: FastMap<Tier, u64> = FastMap::default();
        sizes.insert(tier, size);
        for &child in &children {
            sizes.insert(child, game.game.tier_size(child));
        }
        Ok(Self { tier, size, children, sizes })
    }

    /// Divider slots: one per child tier plus the solving tier, which comes last.
    #[inline]
    pub fn num_indices(&self) -> usize {
        self.children.len() + 1
    }

    #[inline]
    pub fn this_index(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn tier_at(&self, index: usize) -> Tier {
        self.children.get(index).copied().unwrap_or(self.tier)
    }

    pub fn size_of(&self, tier: Tier) -> u64 {
        self.sizes.get(&tier).copied().unwrap_or(0)
    }

    /// Every tier with its size, child tiers first.
    pub fn all_tiers(&self) -> Vec<(Tier, u64)> {
        self.children
            .iter()
            .chain(std::iter::once(&self.tier))
            .map(|&t| (t, self.size_of(t)))
            .collect()
    }

    /// Rejects children outside the solving tier and its child tiers.
    pub fn check_child(&self, parent: TierPosition, child: TierPosition) -> Result<()> {
        match self.sizes.get(&child.tier) {
            Some(&size) if child.position < size => Ok(()),
            _ => Err(SolverError::adapter(
                parent.tier,
                parent.position,
                format!("child {child} is not a position of tier {} or its child tiers", self.tier),
            )),
        }
    }
}

/// Parents of a position in the solving tier, from the game or from a reverse graph.
pub(crate) enum ParentSource<'g> {
    Game,
    Graph(&'g ReverseGraph),
}

impl ParentSource<'_> {
    pub fn parents<'s, G: TierGame + ?Sized>(
        &'s self,
        game: &Checked<'_, G>,
        child: TierPosition,
        parent_tier: Tier,
    ) -> Result<Cow<'s, [Position]>> {
        match self {
            ParentSource::Game => Ok(Cow::Owned(game.parents(child, parent_tier)?)),
            ParentSource::Graph(graph) => Ok(Cow::Borrowed(graph.parents_of(child))),
        }
    }
}
