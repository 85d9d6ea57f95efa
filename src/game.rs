// Game adapter contract.
//
// A game is a set of pure functions over `TierPosition`s. Implementations
// must be callable from many rayon workers at once.

use std::hash::BuildHasherDefault;

use hashbrown::HashSet as HbHashSet;

use crate::config::Limits;
use crate::error::{Result, SolverError};
use crate::types::{Move, Position, Tier, TierPosition, Value};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type FastSet<T> = HbHashSet<T, FastHasher>;

pub trait TierGame: Sync {
    fn initial_tier(&self) -> Tier;
    fn initial_position(&self) -> Position;

    fn tier_size(&self, tier: Tier) -> u64;
    fn generate_moves(&self, tp: TierPosition) -> Vec<Move>;
    fn do_move(&self, tp: TierPosition, mv: Move) -> TierPosition;
    /// Terminal value of `tp`, or `Value::Undecided` for non-terminal positions.
    fn primitive(&self, tp: TierPosition) -> Value;
    fn is_legal_position(&self, tp: TierPosition) -> bool;
    /// Tiers reachable in one move, possibly including `tier` itself and duplicates.
    fn child_tiers(&self, tier: Tier) -> Vec<Tier>;

    fn canonical_tier(&self, tier: Tier) -> Tier {
        tier
    }

    fn canonical_position(&self, tp: TierPosition) -> Position {
        tp.position
    }

    /// Position in `symmetric` equivalent to `tp`. `symmetric` must be a tier
    /// symmetric to `tp.tier`.
    fn position_in_symmetric_tier(&self, tp: TierPosition, symmetric: Tier) -> Position {
        let _ = symmetric;
        tp.position
    }

    /// Whether `canonical_parent_positions` is implemented. Without it the
    /// solver builds a reverse graph of the solving tier.
    fn has_parent_positions(&self) -> bool {
        false
    }

    /// Canonical positions of `parent_tier` with a move into `child`.
    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position> {
        let _ = (child, parent_tier);
        Vec::new()
    }

    /// Distinct children of `tp`, each canonicalized within its own tier.
    fn canonical_child_positions(&self, tp: TierPosition) -> Vec<TierPosition> {
        children_of_moves(self, tp, self.generate_moves(tp))
    }

    fn number_of_canonical_child_positions(&self, tp: TierPosition) -> usize {
        self.canonical_child_positions(tp).len()
    }
}

/// Applies `moves` to `tp` and canonicalizes each child, dropping repeats.
fn children_of_moves<G: TierGame + ?Sized>(game: &G, tp: TierPosition, moves: Vec<Move>) -> Vec<TierPosition> {
    let mut seen: FastSet<TierPosition> = FastSet::with_capacity_and_hasher(moves.len(), FastHasher::default());
    let mut out = Vec::with_capacity(moves.len());
    for mv in moves {
        let mut child = game.do_move(tp, mv);
        child.position = game.canonical_position(child);
        if seen.insert(child) {
            out.push(child);
        }
    }
    out
}

/// Adapter calls with their output sizes checked against `Limits`.
#[derive(Debug)]
pub struct Checked<'a, G: ?Sized> {
    pub game: &'a G,
    pub limits: Limits,
}

impl<G: ?Sized> Clone for Checked<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: ?Sized> Copy for Checked<'_, G> {}

impl<'a, G: TierGame + ?Sized> Checked<'a, G> {
    pub fn new(game: &'a G, limits: Limits) -> Self {
        Self { game, limits }
    }

    pub fn moves(&self, tp: TierPosition) -> Result<Vec<Move>> {
        let moves = self.game.generate_moves(tp);
        SolverError::check_capacity("moves", moves.len(), self.limits.moves)?;
        Ok(moves)
    }

    /// Distinct canonical children of `tp`, expanded from its checked moves.
    pub fn canonical_children(&self, tp: TierPosition) -> Result<Vec<TierPosition>> {
        let children = children_of_moves(self.game, tp, self.moves(tp)?);
        SolverError::check_capacity("child positions", children.len(), self.limits.child_positions)?;
        Ok(children)
    }

    pub fn parents(&self, child: TierPosition, parent_tier: Tier) -> Result<Vec<Position>> {
        let parents = self.game.canonical_parent_positions(child, parent_tier);
        SolverError::check_capacity("parent positions", parents.len(), self.limits.parent_positions)?;
        Ok(parents)
    }

    pub fn child_tiers(&self, tier: Tier) -> Result<Vec<Tier>> {
        let tiers = self.game.child_tiers(tier);
        SolverError::check_capacity("child tiers", tiers.len(), self.limits.child_tiers)?;
        Ok(tiers)
    }

    /// Child tiers of `tier` without duplicates or `tier` itself, in first-seen order.
    pub fn distinct_child_tiers(&self, tier: Tier) -> Result<Vec<Tier>> {
        let mut seen: FastSet<Tier> = FastSet::default();
        Ok(self
            .child_tiers(tier)?
            .into_iter()
            .filter(|&t| t != tier && seen.insert(t))
            .collect())
    }

    /// True if `tp` is a position the solver owns a record for: legal and canonical.
    #[inline]
    pub fn is_solvable(&self, tp: TierPosition) -> bool {
        self.game.is_legal_position(tp) && self.game.canonical_position(tp) == tp.position
    }
}
