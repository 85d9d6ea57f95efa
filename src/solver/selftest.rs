// Adapter self-test.
//
// Samples positions of a tier and checks that the game's functions agree
// with each other: symmetric tiers map back and forth, children are legal
// positions of known tiers, and when the game enumerates parents, parents and
// children describe the same edges.

use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;

use crate::config::Limits;
use crate::error::{Result, TestFailure};
use crate::game::{Checked, TierGame};
use crate::types::{Position, Tier, TierPosition, Value};

/// Positions checked per tier.
pub const SAMPLE_SIZE: u64 = 1000;

/// Positions to check: all of them for small tiers, a seeded sample otherwise.
fn sample(size: u64, seed: u64) -> Vec<Position> {
    if size <= SAMPLE_SIZE {
        return (0..size).collect();
    }
    let mut rng = Pcg64::seed_from_u64(seed);
    (0..SAMPLE_SIZE).map(|_| rng.gen_range(0..size)).collect()
}

/// Checks `tier` against the adapter contract. `parent_tiers` are the tiers
/// with moves into `tier`, used for parent-to-child matching. Returns the
/// first failure found, in sample order.
pub fn test_tier<G: TierGame + ?Sized>(
    game: &G,
    tier: Tier,
    parent_tiers: &[Tier],
    seed: u64,
    limits: Limits,
) -> Result<Option<TestFailure>> {
    let checked = Checked::new(game, limits);
    let mut known = checked.child_tiers(tier)?;
    known.push(tier);
    let positions = sample(game.tier_size(tier), seed);
    debug!("[selftest] tier {tier}: checking {} positions", positions.len());

    let failures = positions
        .par_iter()
        .map(|&p| check_position(&checked, TierPosition::new(tier, p), &known, parent_tiers))
        .collect::<Result<Vec<_>>>()?;
    let failure = failures.into_iter().flatten().next();
    if let Some(f) = &failure {
        warn!("[selftest] tier {tier}: {f}");
    }
    Ok(failure)
}

fn check_position<G: TierGame + ?Sized>(
    checked: &Checked<'_, G>,
    tp: TierPosition,
    known_tiers: &[Tier],
    parent_tiers: &[Tier],
) -> Result<Option<TestFailure>> {
    let game = checked.game;
    if !game.is_legal_position(tp) || game.primitive(tp) != Value::Undecided {
        return Ok(None);
    }
    let TierPosition { tier, position } = tp;

    if game.position_in_symmetric_tier(tp, tier) != position {
        return Ok(Some(TestFailure::TierSymmetrySelfMapping { tier, position }));
    }
    let canonical_tier = game.canonical_tier(tier);
    if canonical_tier != tier {
        let there = game.position_in_symmetric_tier(tp, canonical_tier);
        let back = game.position_in_symmetric_tier(TierPosition::new(canonical_tier, there), tier);
        if back != position {
            return Ok(Some(TestFailure::TierSymmetryInconsistent { tier, position, symmetric: canonical_tier }));
        }
    }

    let children = checked.canonical_children(tp)?;
    for &child in &children {
        let in_range = known_tiers.contains(&child.tier) && child.position < game.tier_size(child.tier);
        if !in_range || !game.is_legal_position(child) {
            return Ok(Some(TestFailure::IllegalChild {
                tier,
                position,
                child_tier: child.tier,
                child_position: child.position,
            }));
        }
    }

    if !game.has_parent_positions() {
        return Ok(None);
    }
    let canonical_self = game.canonical_position(tp);
    for &child in &children {
        if !checked.parents(child, tier)?.contains(&canonical_self) {
            return Ok(Some(TestFailure::ChildParentMismatch {
                tier,
                position,
                child_tier: child.tier,
                child_position: child.position,
            }));
        }
    }

    let me = TierPosition::new(tier, canonical_self);
    for &parent_tier in parent_tiers {
        for parent in checked.parents(tp, parent_tier)? {
            let ptp = TierPosition::new(parent_tier, parent);
            if !game.is_legal_position(ptp) || game.primitive(ptp) != Value::Undecided {
                continue;
            }
            if !checked.canonical_children(ptp)?.contains(&me) {
                return Ok(Some(TestFailure::ParentChildMismatch {
                    tier,
                    position,
                    parent_tier,
                    parent_position: parent,
                }));
            }
        }
    }
    Ok(None)
}
