// Reachability discovery and per-tier statistics.
//
// Discovery is a breadth-first sweep over one tier. The fringe of a sweep is
// normally held in per-task position arrays charged to the pool. When a push
// fails for lack of memory, the rest of that sweep records newly discovered
// positions in a pre-sized bitset instead, and the next sweep runs from the
// bitset until the arrays fit again. A position enters the fringe exactly
// once: only the task that flips its bit in the tier's discovery map may add
// it.

use std::sync::atomic::Ordering;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::analysis::Analysis;
use crate::bitset::ConcurrentBitset;
use crate::concurrency::ConcurrentBool;
use crate::config::SolveOptions;
use crate::db::{Database, TierStatus};
use crate::error::{Result, SolverError};
use crate::game::{Checked, TierGame};
use crate::memory::{Allocator, TrackedVec};
use crate::solver::{positions, stored_position};
use crate::types::{Position, Tier, TierPosition};

const TAG: &str = "analyzer";

/// Outcome of discovering one tier.
#[derive(Debug)]
pub struct Discovery {
    pub tier: Tier,
    /// Positions of `tier` reachable from the positions already known.
    pub map: ConcurrentBitset,
    /// Positions discovered in each canonical child tier, merged with what
    /// was stored before.
    pub child_maps: Vec<(Tier, ConcurrentBitset)>,
    pub sweeps: u32,
    /// Sweeps that spilled at least one position into the bitset fringe.
    pub fallback_sweeps: u32,
}

enum Fringe {
    Array(Vec<TrackedVec<Position>>),
    Bits,
}

impl Fringe {
    fn is_empty(&self, bits: &ConcurrentBitset) -> bool {
        match self {
            Fringe::Array(parts) => parts.iter().all(|p| p.is_empty()),
            Fringe::Bits => bits.count_ones() == 0,
        }
    }
}

/// Moves the bitset fringe into one pool-charged array if it fits.
fn fringe_from_bits(bits: &mut ConcurrentBitset, allocator: &Allocator) -> Result<Fringe> {
    let count = bits.count_ones();
    match TrackedVec::with_capacity(allocator, count) {
        Ok(mut array) => {
            for p in bits.ones() {
                array.push(p as Position)?;
            }
            bits.reset_all();
            Ok(Fringe::Array(vec![array]))
        }
        Err(SolverError::OutOfMemory { .. }) => Ok(Fringe::Bits),
        Err(e) => Err(e),
    }
}

/// Marks every position of `tier` reachable from its stored discovery map
/// (plus the initial position, for the initial tier) and the positions those
/// reach in child tiers. Both maps are persisted.
pub fn discover_tier<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    tier: Tier,
    options: &SolveOptions,
) -> Result<Discovery> {
    let checked = Checked::new(game, options.limits);
    let allocator = options.allocator();
    let size = game.tier_size(tier) as usize;
    let chunk = options.min_chunk();

    let mut children: Vec<Tier> = Vec::new();
    for child in checked.distinct_child_tiers(tier)? {
        let canonical = game.canonical_tier(child);
        if canonical != tier && !children.contains(&canonical) {
            children.push(canonical);
        }
    }

    let load_map = |t: Tier, bits: usize| -> Result<ConcurrentBitset> {
        match db.load_discovery_map(t, bits, &allocator)? {
            Some(map) => Ok(map),
            None => ConcurrentBitset::new_in(bits, &allocator),
        }
    };
    let map = load_map(tier, size)?;
    let initial = stored_position(game, TierPosition::new(game.initial_tier(), game.initial_position()));
    if initial.tier == tier {
        map.set(initial.position as usize, Ordering::Relaxed);
    }
    let child_maps = children
        .iter()
        .map(|&c| Ok((c, load_map(c, game.tier_size(c) as usize)?)))
        .collect::<Result<Vec<_>>>()?;
    let child_index = |t: Tier| child_maps.iter().position(|(c, _)| *c == t);

    let mut fringe_bits = ConcurrentBitset::new_in(size, &allocator)?;
    let mut overflow_bits = ConcurrentBitset::new_in(size, &allocator)?;
    for p in map.ones() {
        fringe_bits.set(p, Ordering::Relaxed);
    }
    let mut fringe = fringe_from_bits(&mut fringe_bits, &allocator)?;

    let mut sweeps = 0u32;
    let mut fallback_sweeps = 0u32;
    while !fringe.is_empty(&fringe_bits) {
        sweeps += 1;
        let overflow = ConcurrentBool::new(false);
        let visit = |mut found: TrackedVec<Position>, pos: Position| -> Result<TrackedVec<Position>> {
            for child in checked.canonical_children(TierPosition::new(tier, pos))? {
                if child.tier == tier {
                    if child.position as usize >= size {
                        return Err(SolverError::adapter(tier, pos, format!("child {child} out of range")));
                    }
                    if map.set(child.position as usize, Ordering::Relaxed) {
                        continue;
                    }
                    if overflow.load() {
                        overflow_bits.set(child.position as usize, Ordering::Relaxed);
                        continue;
                    }
                    match found.push(child.position) {
                        Ok(()) => {}
                        Err(SolverError::OutOfMemory { .. }) => {
                            overflow.set();
                            overflow_bits.set(child.position as usize, Ordering::Relaxed);
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    let stored = stored_position(game, child);
                    let (_, child_map) = child_index(stored.tier)
                        .and_then(|i| child_maps.get(i))
                        .filter(|(_, m)| (stored.position as usize) < m.num_bits())
                        .ok_or_else(|| {
                            SolverError::adapter(tier, pos, format!("child {child} is not in a child tier of {tier}"))
                        })?;
                    child_map.set(stored.position as usize, Ordering::Relaxed);
                }
            }
            Ok(found)
        };

        let next: Vec<TrackedVec<Position>> = match &fringe {
            Fringe::Array(parts) => parts
                .par_iter()
                .flat_map_iter(|part| part.iter().copied())
                .try_fold(|| TrackedVec::new(&allocator), &visit)
                .collect::<Result<_>>()?,
            Fringe::Bits => positions(size as u64, chunk)
                .filter(|&p| fringe_bits.test(p as usize, Ordering::Relaxed))
                .try_fold(|| TrackedVec::new(&allocator), &visit)
                .collect::<Result<_>>()?,
        };
        drop(fringe);
        fringe_bits.reset_all();

        if overflow.load() {
            fallback_sweeps += 1;
            for part in &next {
                for &p in part.iter() {
                    overflow_bits.set(p as usize, Ordering::Relaxed);
                }
            }
            drop(next);
            std::mem::swap(&mut fringe_bits, &mut overflow_bits);
            warn!(
                "[{TAG}] tier {tier}: sweep {sweeps} ran out of memory, {} positions carried in the bitset",
                fringe_bits.count_ones()
            );
            fringe = fringe_from_bits(&mut fringe_bits, &allocator)?;
        } else {
            fringe = Fringe::Array(next);
        }
    }

    db.save_discovery_map(tier, &map)?;
    for (child, child_map) in &child_maps {
        db.save_discovery_map(*child, child_map)?;
    }
    debug!(
        "[{TAG}] tier {tier}: {} positions discovered in {sweeps} sweeps ({fallback_sweeps} with bitset fallback)",
        map.count_ones()
    );
    Ok(Discovery { tier, map, child_maps, sweeps, fallback_sweeps })
}

/// Discovers `tier` and computes statistics over its reachable positions.
/// The tier must be solved. Returns `None` if an analysis is already stored
/// and `force` is off.
pub fn analyze_tier<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    tier: Tier,
    options: &SolveOptions,
) -> Result<Option<Analysis>> {
    if !options.force && db.analysis_status(tier) == TierStatus::Solved {
        info!("[{TAG}] tier {tier} already analyzed, skipping");
        return Ok(None);
    }
    let started = Instant::now();
    let discovery = discover_tier(game, db, tier, options)?;
    let checked = Checked::new(game, options.limits);

    let reachable: Vec<Position> = discovery.map.ones().map(|p| p as Position).collect();
    let mut analysis = reachable
        .par_iter()
        .with_min_len(options.min_chunk())
        .try_fold(
            || (db.probe(), Analysis::new(tier, game.tier_size(tier))),
            |(mut probe, mut partial), &pos| {
                let tp = TierPosition::new(tier, pos);
                let record = probe.record(stored_position(game, tp))?;
                let moves = checked.moves(tp)?.len();
                partial.count(record.value(), record.remoteness(), moves);
                Ok::<_, SolverError>((probe, partial))
            },
        )
        .map(|acc| acc.map(|(_, partial)| partial))
        .try_reduce(
            || Analysis::new(tier, game.tier_size(tier)),
            |mut a, b| {
                a.merge(&b);
                Ok(a)
            },
        )?;
    analysis.sweeps = discovery.sweeps;
    analysis.fallback_sweeps = discovery.fallback_sweeps;
    db.save_analysis(&analysis)?;
    info!(
        "[{TAG}] tier {tier}: {} reachable of {} in {:.2?}",
        analysis.reachable,
        analysis.tier_size,
        started.elapsed()
    );
    Ok(Some(analysis))
}
