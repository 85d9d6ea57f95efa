// Explicit position graphs implementing `TierGame`.
//
// A `SyntheticGame` has no rules of its own: every position lists its
// children outright. Games are either spelled out with `SyntheticBuilder` or
// generated from a seed with `SyntheticGame::random`. Generated games only
// move from tier `i` into tiers `<= i`, so the tier graph has no loops.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::game::TierGame;
use crate::solver::FastMap;
use crate::types::{Move, Position, Tier, TierPosition, Value};

/// Tier `ALIAS_OFFSET + i` of a generated game is a renamed copy of tier `i`.
pub const ALIAS_OFFSET: Tier = 1000;

#[derive(Debug, Clone)]
struct Node {
    legal: bool,
    primitive: Value,
    canonical: Position,
    children: Vec<TierPosition>,
}

#[derive(Debug, Clone, Default)]
struct TierData {
    nodes: Vec<Node>,
    child_tiers: Vec<Tier>,
}

#[derive(Debug, Clone)]
pub struct SyntheticGame {
    initial: TierPosition,
    tiers: FastMap<Tier, TierData>,
    aliases: FastMap<Tier, Tier>,
    parents: Option<FastMap<(TierPosition, Tier), Vec<Position>>>,
}

/// Describes a game position by position.
#[derive(Debug, Default)]
pub struct SyntheticBuilder {
    tiers: BTreeMap<Tier, TierData>,
    aliases: BTreeMap<Tier, Tier>,
    parents: bool,
    initial: Option<TierPosition>,
}

impl SyntheticBuilder {
    pub fn new() -> Self {
        Self { parents: true, ..Self::default() }
    }

    /// Adds a tier of `size` legal, non-primitive positions without moves.
    pub fn tier(mut self, tier: Tier, size: u64) -> Self {
        let nodes = (0..size)
            .map(|p| Node { legal: true, primitive: Value::Undecided, canonical: p, children: Vec::new() })
            .collect();
        self.tiers.insert(tier, TierData { nodes, child_tiers: Vec::new() });
        self
    }

    fn node(&mut self, tp: TierPosition) -> Option<&mut Node> {
        self.tiers.get_mut(&tp.tier)?.nodes.get_mut(tp.position as usize)
    }

    pub fn primitive(mut self, tp: TierPosition, value: Value) -> Self {
        if let Some(node) = self.node(tp) {
            node.primitive = value;
        }
        self
    }

    pub fn illegal(mut self, tp: TierPosition) -> Self {
        if let Some(node) = self.node(tp) {
            node.legal = false;
        }
        self
    }

    pub fn edge(mut self, from: TierPosition, to: TierPosition) -> Self {
        if let Some(node) = self.node(from) {
            node.children.push(to);
        }
        self
    }

    /// Declares `tp` symmetric to `canonical`, a position of the same tier.
    pub fn canonical(mut self, tp: TierPosition, canonical: Position) -> Self {
        if let Some(node) = self.node(tp) {
            node.canonical = canonical;
        }
        self
    }

    /// Declares `tier` a renamed copy of `canonical`, position for position.
    pub fn alias(mut self, tier: Tier, canonical: Tier) -> Self {
        self.aliases.insert(tier, canonical);
        self
    }

    /// Whether the game answers parent queries itself.
    pub fn parents(mut self, on: bool) -> Self {
        self.parents = on;
        self
    }

    pub fn initial(mut self, tp: TierPosition) -> Self {
        self.initial = Some(tp);
        self
    }

    pub fn build(self) -> Result<SyntheticGame> {
        let Self { tiers, aliases, parents, initial } = self;
        let mut game = SyntheticGame {
            initial: initial.unwrap_or_default(),
            tiers: tiers.into_iter().collect(),
            aliases: aliases.into_iter().collect(),
            parents: None,
        };
        for (&alias, &canonical) in &game.aliases {
            if !game.tiers.contains_key(&canonical) || game.tiers.contains_key(&alias) {
                return Err(SolverError::Runtime(format!("tier {alias} cannot alias tier {canonical}")));
            }
        }
        if game.tiers.is_empty() {
            return Err(SolverError::Runtime("game has no tiers".into()));
        }
        if initial.is_none() {
            let lowest = game.tiers.keys().copied().min().unwrap_or_default();
            game.initial = TierPosition::new(lowest, 0);
        }

        let sizes: FastMap<Tier, u64> = game
            .tiers
            .keys()
            .chain(game.aliases.keys())
            .map(|&t| (t, game.tier_size(t)))
            .collect();
        for (&tier, data) in &mut game.tiers {
            let mut child_tiers = Vec::new();
            for (p, node) in data.nodes.iter().enumerate() {
                for child in &node.children {
                    if sizes.get(&child.tier).map_or(true, |&size| child.position >= size) {
                        return Err(SolverError::adapter(tier, p as Position, format!("edge to unknown position {child}")));
                    }
                    if !child_tiers.contains(&child.tier) {
                        child_tiers.push(child.tier);
                    }
                }
            }
            child_tiers.sort_unstable();
            data.child_tiers = child_tiers;
        }
        game.set_parents(parents);
        Ok(game)
    }
}

/// Shape of a generated game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomGameParams {
    pub seed: u64,
    /// Tiers `0..tiers`; the initial position lives in the last one.
    pub tiers: u64,
    /// Positions per tier before mirroring.
    pub tier_size: u64,
    pub max_moves: usize,
    pub primitive_ratio: f64,
    pub illegal_ratio: f64,
    /// Chance that a move stays in its own tier.
    pub in_tier_ratio: f64,
    /// Doubles every position: `2b + 1` is a symmetric copy of `2b`.
    pub mirrored: bool,
    /// Sends half of the cross-tier moves into alias tiers.
    pub aliases: bool,
    pub parents: bool,
}

impl Default for RandomGameParams {
    fn default() -> Self {
        Self {
            seed: 0,
            tiers: 4,
            tier_size: 64,
            max_moves: 3,
            primitive_ratio: 0.15,
            illegal_ratio: 0.05,
            in_tier_ratio: 0.5,
            mirrored: false,
            aliases: false,
            parents: true,
        }
    }
}

impl SyntheticGame {
    pub fn builder() -> SyntheticBuilder {
        SyntheticBuilder::new()
    }

    /// Generates a game from `params`. The same parameters always give the same game.
    pub fn random(params: &RandomGameParams) -> Result<Self> {
        if params.tiers == 0 || params.tiers >= ALIAS_OFFSET {
            return Err(SolverError::Runtime(format!("tier count {} out of range", params.tiers)));
        }
        let mut rng = Pcg64::seed_from_u64(params.seed);
        let chance = |p: f64| p.clamp(0.0, 1.0);
        let n = params.tier_size.max(1);
        let copies: u64 = if params.mirrored { 2 } else { 1 };

        // Base position shapes first, so that moves can target legal positions of any tier.
        let mut shapes: Vec<Vec<(bool, Value)>> = Vec::new();
        for _ in 0..params.tiers {
            let tier_shapes = (0..n)
                .map(|b| {
                    if b > 0 && rng.gen_bool(chance(params.illegal_ratio)) {
                        (false, Value::Undecided)
                    } else if rng.gen_bool(chance(params.primitive_ratio)) {
                        (true, [Value::Lose, Value::Win, Value::Tie][rng.gen_range(0..3)])
                    } else {
                        (true, Value::Undecided)
                    }
                })
                .collect();
            shapes.push(tier_shapes);
        }
        let legal: Vec<Vec<u64>> = shapes
            .iter()
            .map(|tier| (0..n).filter(|&b| tier[b as usize].0).collect())
            .collect();

        let mut builder = SyntheticBuilder::new().parents(params.parents);
        for i in 0..params.tiers {
            builder = builder.tier(i, n * copies);
            if params.aliases {
                builder = builder.alias(ALIAS_OFFSET + i, i);
            }
        }
        for i in 0..params.tiers {
            for b in 0..n {
                let (is_legal, primitive) = shapes[i as usize][b as usize];
                let base = TierPosition::new(i, b * copies);
                let copy = TierPosition::new(i, b * copies + 1);
                if params.mirrored {
                    builder = builder.canonical(copy, base.position);
                }
                if !is_legal {
                    builder = builder.illegal(base);
                    if params.mirrored {
                        builder = builder.illegal(copy);
                    }
                    continue;
                }
                if primitive != Value::Undecided {
                    builder = builder.primitive(base, primitive);
                    if params.mirrored {
                        builder = builder.primitive(copy, primitive);
                    }
                    continue;
                }
                let moves = rng.gen_range(1..=params.max_moves.max(1));
                for _ in 0..moves {
                    let target = if i == 0 || rng.gen_bool(chance(params.in_tier_ratio)) {
                        i
                    } else {
                        rng.gen_range(0..i)
                    };
                    let targets = &legal[target as usize];
                    let tb = targets[rng.gen_range(0..targets.len())];
                    let position = tb * copies + if params.mirrored { rng.gen_range(0..2) } else { 0 };
                    let name = if params.aliases && target != i && rng.gen_bool(0.5) {
                        ALIAS_OFFSET + target
                    } else {
                        target
                    };
                    let child = TierPosition::new(name, position);
                    builder = builder.edge(base, child);
                    if params.mirrored {
                        builder = builder.edge(copy, child);
                    }
                }
            }
        }

        let top = params.tiers - 1;
        let start = (0..n)
            .find(|&b| shapes[top as usize][b as usize] == (true, Value::Undecided))
            .unwrap_or(0);
        builder.initial(TierPosition::new(top, start * copies)).build()
    }

    /// Switches the parents API on or off.
    pub fn with_parents(mut self, on: bool) -> Self {
        self.set_parents(on);
        self
    }

    fn set_parents(&mut self, on: bool) {
        if !on {
            self.parents = None;
            return;
        }
        let mut index: FastMap<(TierPosition, Tier), Vec<Position>> = FastMap::default();
        let mut tiers: Vec<Tier> = self.tiers.keys().copied().collect();
        tiers.sort_unstable();
        for tier in tiers {
            for p in 0..self.tier_size(tier) {
                let tp = TierPosition::new(tier, p);
                if !self.is_legal_position(tp)
                    || self.primitive(tp) != Value::Undecided
                    || self.canonical_position(tp) != p
                {
                    continue;
                }
                for child in self.canonical_child_positions(tp) {
                    index.entry((child, tier)).or_default().push(p);
                }
            }
        }
        self.parents = Some(index);
    }

    /// Tiers with their own positions, in ascending order. Aliases are not listed.
    pub fn tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self.tiers.keys().copied().collect();
        tiers.sort_unstable();
        tiers
    }

    fn data(&self, tier: Tier) -> Option<&TierData> {
        let tier = self.aliases.get(&tier).copied().unwrap_or(tier);
        self.tiers.get(&tier)
    }

    fn node(&self, tp: TierPosition) -> Option<&Node> {
        self.data(tp.tier)?.nodes.get(tp.position as usize)
    }
}

impl TierGame for SyntheticGame {
    fn initial_tier(&self) -> Tier {
        self.initial.tier
    }

    fn initial_position(&self) -> Position {
        self.initial.position
    }

    fn tier_size(&self, tier: Tier) -> u64 {
        self.data(tier).map_or(0, |d| d.nodes.len() as u64)
    }

    fn generate_moves(&self, tp: TierPosition) -> Vec<Move> {
        match self.node(tp) {
            Some(node) if node.legal && node.primitive == Value::Undecided => (0..node.children.len() as Move).collect(),
            _ => Vec::new(),
        }
    }

    fn do_move(&self, tp: TierPosition, mv: Move) -> TierPosition {
        self.node(tp)
            .and_then(|node| node.children.get(mv as usize))
            .copied()
            .unwrap_or(tp)
    }

    fn primitive(&self, tp: TierPosition) -> Value {
        self.node(tp).map_or(Value::Undecided, |node| node.primitive)
    }

    fn is_legal_position(&self, tp: TierPosition) -> bool {
        self.node(tp).is_some_and(|node| node.legal)
    }

    fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
        self.data(tier).map(|d| d.child_tiers.clone()).unwrap_or_default()
    }

    fn canonical_tier(&self, tier: Tier) -> Tier {
        self.aliases.get(&tier).copied().unwrap_or(tier)
    }

    fn canonical_position(&self, tp: TierPosition) -> Position {
        self.node(tp).map_or(tp.position, |node| node.canonical)
    }

    fn has_parent_positions(&self) -> bool {
        self.parents.is_some()
    }

    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position> {
        self.parents
            .as_ref()
            .and_then(|index| index.get(&(child, parent_tier)))
            .cloned()
            .unwrap_or_default()
    }
}
