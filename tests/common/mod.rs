#![allow(dead_code)]

use std::collections::HashMap;

use tempfile::{tempdir, TempDir};
use tiersolve::solver::build_tier_graph;
use tiersolve::{
    solve_all, ArrayDb, CheckpointPolicy, Database, Limits, RandomGameParams, Remoteness, SolveOptions, Strategy,
    SyntheticGame, Tier, TierGame, TierPosition, TierProbe, TierStatus, Value,
};

pub fn temp_db() -> (TempDir, ArrayDb) {
    let dir = tempdir().expect("tempdir");
    let db = ArrayDb::open(dir.path()).expect("open db");
    (dir, db)
}

/// Small chunks so that even tiny tiers are split across tasks.
pub fn options(strategy: Strategy) -> SolveOptions {
    SolveOptions {
        strategy,
        scan_chunk: 4,
        checkpoint: CheckpointPolicy { enabled: false, ..CheckpointPolicy::default() },
        ..SolveOptions::default()
    }
}

pub fn random_game(seed: u64, mirrored: bool, aliases: bool, parents: bool) -> SyntheticGame {
    let params = RandomGameParams { seed, tiers: 3, tier_size: 40, mirrored, aliases, parents, ..RandomGameParams::default() };
    SyntheticGame::random(&params).expect("random game")
}

pub fn tp(tier: Tier, position: u64) -> TierPosition {
    TierPosition::new(tier, position)
}

/// Canonical tiers reachable from the initial tier, children first.
pub fn solved_tiers(game: &SyntheticGame) -> Vec<Tier> {
    build_tier_graph(game, Limits::default()).expect("tier graph").tiers().to_vec()
}

pub fn solve_with(game: &SyntheticGame, strategy: Strategy) -> (TempDir, ArrayDb) {
    let (dir, db) = temp_db();
    let report = solve_all(game, &db, &options(strategy), None, |_| {}).expect("solve_all");
    assert!(report.is_success(), "run failed: {report:?}");
    (dir, db)
}

pub fn digests(game: &SyntheticGame, db: &ArrayDb) -> Vec<(Tier, String)> {
    solved_tiers(game)
        .into_iter()
        .map(|t| (t, db.tier_digest(t).expect("digest")))
        .collect()
}

fn stored(game: &SyntheticGame, tp: TierPosition) -> TierPosition {
    let canonical = game.canonical_tier(tp.tier);
    if canonical == tp.tier {
        return tp;
    }
    let mapped = TierPosition::new(canonical, game.position_in_symmetric_tier(tp, canonical));
    TierPosition::new(canonical, game.canonical_position(mapped))
}

/// Outcomes of every legal canonical position, computed by plain rounds over
/// the whole game at once without any tiering.
pub fn reference_outcomes(game: &SyntheticGame) -> HashMap<TierPosition, (Value, Remoteness)> {
    let mut known: HashMap<TierPosition, (Value, Remoteness)> = HashMap::new();
    let mut open: Vec<TierPosition> = Vec::new();
    for tier in game.tiers() {
        for p in 0..game.tier_size(tier) {
            let here = tp(tier, p);
            if !game.is_legal_position(here) || game.canonical_position(here) != p {
                continue;
            }
            match game.primitive(here) {
                Value::Undecided => open.push(here),
                v => {
                    known.insert(here, (v, 0));
                }
            }
        }
    }
    let children: HashMap<TierPosition, Vec<TierPosition>> = open
        .iter()
        .map(|&p| (p, game.canonical_child_positions(p).into_iter().map(|c| stored(game, c)).collect()))
        .collect();

    let largest = |known: &HashMap<TierPosition, (Value, Remoteness)>, values: &[Value]| {
        known.values().filter(|(v, _)| values.contains(v)).map(|&(_, r)| r).max().unwrap_or(0)
    };

    let mut i: Remoteness = 1;
    loop {
        let mut round = Vec::new();
        for &p in &open {
            if known.contains_key(&p) {
                continue;
            }
            let outcomes: Vec<Option<(Value, Remoteness)>> = children[&p].iter().map(|c| known.get(c).copied()).collect();
            if outcomes.iter().any(|o| matches!(o, Some((Value::Lose, r)) if r + 1 == i)) {
                round.push((p, (Value::Win, i)));
            } else if outcomes.iter().all(|o| matches!(o, Some((Value::Win, _))))
                && outcomes.iter().filter_map(|o| o.map(|(_, r)| r)).max() == Some(i - 1)
            {
                round.push((p, (Value::Lose, i)));
            }
        }
        let done = round.is_empty() && i > largest(&known, &[Value::Win, Value::Lose]);
        known.extend(round);
        if done {
            break;
        }
        i += 1;
    }

    let mut i: Remoteness = 1;
    loop {
        let mut round = Vec::new();
        for &p in &open {
            if known.contains_key(&p) {
                continue;
            }
            if children[&p].iter().any(|c| matches!(known.get(c), Some(&(Value::Tie, r)) if r + 1 == i)) {
                round.push((p, (Value::Tie, i)));
            }
        }
        let done = round.is_empty() && i > largest(&known, &[Value::Tie]);
        known.extend(round);
        if done {
            break;
        }
        i += 1;
    }

    for &p in &open {
        known.entry(p).or_insert((Value::Draw, 0));
    }
    known
}

/// Checks every solvable position of every solved tier against `reference_outcomes`.
pub fn assert_matches_reference(game: &SyntheticGame, db: &ArrayDb) {
    let expected = reference_outcomes(game);
    let tiers = solved_tiers(game);
    let mut probe = db.probe();
    let mut checked = 0usize;
    for (&position, &outcome) in &expected {
        if !tiers.contains(&position.tier) {
            continue;
        }
        assert_eq!(db.tier_status(position.tier), TierStatus::Solved);
        let record = probe.record(position).expect("probe");
        assert_eq!(record.outcome(), outcome, "position {position}");
        checked += 1;
    }
    assert!(checked > 0, "no positions checked");
}
