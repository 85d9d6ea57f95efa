mod common;

use common::{random_game, tp};
use tiersolve::solver::selftest::test_tier;
use tiersolve::{test_all, Limits, Move, Position, SyntheticGame, TestFailure, Tier, TierGame, TierPosition, Value};

/// A synthetic game with one adapter function broken on purpose.
struct Broken {
    inner: SyntheticGame,
    fault: Fault,
}

enum Fault {
    /// Claims to enumerate parents but never returns any.
    NoParents,
    /// Lists `parent` as a parent of `child` without the move existing.
    ExtraParent { child: TierPosition, parent: Position },
    /// Positions do not map to themselves within their own tier.
    ShiftedSelfMapping,
    /// Mapping into the alias tier does not invert mapping out of it.
    OneWayAlias { alias: Tier },
}

impl TierGame for Broken {
    fn initial_tier(&self) -> Tier {
        self.inner.initial_tier()
    }

    fn initial_position(&self) -> Position {
        self.inner.initial_position()
    }

    fn tier_size(&self, tier: Tier) -> u64 {
        self.inner.tier_size(tier)
    }

    fn generate_moves(&self, tp: TierPosition) -> Vec<Move> {
        self.inner.generate_moves(tp)
    }

    fn do_move(&self, tp: TierPosition, mv: Move) -> TierPosition {
        self.inner.do_move(tp, mv)
    }

    fn primitive(&self, tp: TierPosition) -> Value {
        self.inner.primitive(tp)
    }

    fn is_legal_position(&self, tp: TierPosition) -> bool {
        self.inner.is_legal_position(tp)
    }

    fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
        self.inner.child_tiers(tier)
    }

    fn canonical_tier(&self, tier: Tier) -> Tier {
        self.inner.canonical_tier(tier)
    }

    fn canonical_position(&self, tp: TierPosition) -> Position {
        self.inner.canonical_position(tp)
    }

    fn position_in_symmetric_tier(&self, tp: TierPosition, symmetric: Tier) -> Position {
        match self.fault {
            Fault::ShiftedSelfMapping => (tp.position + 1) % self.tier_size(tp.tier),
            Fault::OneWayAlias { alias } if symmetric == alias && tp.tier != alias => {
                (tp.position + 1) % self.tier_size(tp.tier)
            }
            _ => tp.position,
        }
    }

    fn has_parent_positions(&self) -> bool {
        true
    }

    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position> {
        match self.fault {
            Fault::NoParents => Vec::new(),
            Fault::ExtraParent { child: c, parent } => {
                let mut parents = self.inner.canonical_parent_positions(child, parent_tier);
                if child == c {
                    parents.push(parent);
                }
                parents
            }
            _ => self.inner.canonical_parent_positions(child, parent_tier),
        }
    }
}

fn abc() -> SyntheticGame {
    SyntheticGame::builder()
        .tier(0, 3)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 2))
        .primitive(tp(0, 1), Value::Lose)
        .primitive(tp(0, 2), Value::Win)
        .build()
        .expect("game")
}

#[test]
fn generated_games_pass() {
    for seed in 0..4 {
        for (mirrored, aliases, parents) in [(false, false, true), (true, true, true), (true, true, false)] {
            let game = random_game(seed, mirrored, aliases, parents);
            let failures = test_all(&game, Limits::default(), seed).expect("self-test");
            assert!(failures.is_empty(), "seed {seed}: {failures:?}");
        }
    }
}

#[test]
fn move_into_an_illegal_position() {
    let game = SyntheticGame::builder()
        .tier(0, 3)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 2))
        .primitive(tp(0, 1), Value::Lose)
        .illegal(tp(0, 2))
        .build()
        .expect("game");
    let failures = test_all(&game, Limits::default(), 0).expect("self-test");
    assert_eq!(
        failures,
        vec![(0, TestFailure::IllegalChild { tier: 0, position: 0, child_tier: 0, child_position: 2 })]
    );
    assert_eq!(failures[0].1.code(), 1);
}

#[test]
fn child_without_its_parent() {
    let game = Broken { inner: abc(), fault: Fault::NoParents };
    let failure = test_tier(&game, 0, &[0], 0, Limits::default()).expect("self-test");
    assert_eq!(
        failure,
        Some(TestFailure::ChildParentMismatch { tier: 0, position: 0, child_tier: 0, child_position: 1 })
    );
    assert_eq!(failure.map(|f| f.code()), Some(2));
}

#[test]
fn parent_without_the_move() {
    // 0 -> 1 -> 3 (a primitive loss) and 2 -> 0. The game also claims 2 is a
    // parent of 1.
    let inner = SyntheticGame::builder()
        .tier(0, 4)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 1), tp(0, 3))
        .edge(tp(0, 2), tp(0, 0))
        .primitive(tp(0, 3), Value::Lose)
        .build()
        .expect("game");
    let game = Broken { inner, fault: Fault::ExtraParent { child: tp(0, 1), parent: 2 } };
    let failures = test_all(&game, Limits::default(), 0).expect("self-test");
    assert_eq!(
        failures,
        vec![(0, TestFailure::ParentChildMismatch { tier: 0, position: 1, parent_tier: 0, parent_position: 2 })]
    );
    assert_eq!(failures[0].1.code(), 3);
}

#[test]
fn position_not_mapping_to_itself() {
    let game = Broken { inner: abc(), fault: Fault::ShiftedSelfMapping };
    let failure = test_tier(&game, 0, &[], 0, Limits::default()).expect("self-test");
    assert_eq!(failure, Some(TestFailure::TierSymmetrySelfMapping { tier: 0, position: 0 }));
    assert_eq!(failure.map(|f| f.code()), Some(4));
}

#[test]
fn alias_that_does_not_round_trip() {
    let inner = SyntheticGame::builder()
        .tier(0, 3)
        .alias(7, 0)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 2))
        .primitive(tp(0, 1), Value::Lose)
        .primitive(tp(0, 2), Value::Win)
        .build()
        .expect("game");
    let game = Broken { inner, fault: Fault::OneWayAlias { alias: 7 } };

    // Canonical tiers never map elsewhere, so only the alias shows the fault.
    assert_eq!(test_tier(&game, 0, &[], 0, Limits::default()).expect("canonical"), None);
    let failure = test_tier(&game, 7, &[], 0, Limits::default()).expect("alias");
    assert_eq!(failure, Some(TestFailure::TierSymmetryInconsistent { tier: 7, position: 0, symmetric: 0 }));
    assert_eq!(failure.map(|f| f.code()), Some(5));
}

#[test]
fn large_tiers_are_sampled() {
    let size = 5000;
    let mut builder = SyntheticGame::builder().tier(0, size).primitive(tp(0, size - 1), Value::Lose);
    for p in 0..size - 1 {
        builder = builder.edge(tp(0, p), tp(0, p + 1));
    }
    let game = builder.build().expect("game");
    assert_eq!(test_tier(&game, 0, &[0], 42, Limits::default()).expect("self-test"), None);
}
