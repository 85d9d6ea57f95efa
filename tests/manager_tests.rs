mod common;

use common::{options, random_game, solve_with, temp_db, tp};
use tiersolve::solver::build_tier_graph;
use tiersolve::synthetic::ALIAS_OFFSET;
use tiersolve::{
    analyze_all, solve_all, Database, ErrorCode, Limits, SolveOptions, SolverError, Strategy, SyntheticGame, TierStatus,
    Value,
};

/// Tiers 0 and 1 move into each other.
fn looping() -> SyntheticGame {
    SyntheticGame::builder()
        .tier(0, 2)
        .tier(1, 2)
        .edge(tp(0, 0), tp(1, 0))
        .edge(tp(1, 0), tp(0, 0))
        .initial(tp(0, 0))
        .build()
        .expect("game")
}

#[test]
fn loops_between_tiers_are_rejected() {
    let game = looping();
    let graph = build_tier_graph(&game, Limits::default());
    assert!(matches!(graph, Err(SolverError::TierGraph(_))), "{graph:?}");
    assert_eq!(ErrorCode::of(&graph), ErrorCode::IllegalGameTierGraph);

    let (_dir, db) = temp_db();
    let run = solve_all(&game, &db, &options(Strategy::Auto), None, |_| {});
    assert_eq!(ErrorCode::of(&run), ErrorCode::IllegalGameTierGraph);
    assert_eq!(db.tier_status(0), TierStatus::Missing);
}

#[test]
fn graph_lists_children_before_parents() {
    let game = random_game(2, true, true, true);
    let graph = build_tier_graph(&game, Limits::default()).expect("graph");
    assert_eq!(graph.tiers().last().copied(), Some(graph.root()));
    for (i, &tier) in graph.tiers().iter().enumerate() {
        assert!(tier < ALIAS_OFFSET, "alias tier {tier} listed as canonical");
        for child in graph.children(tier) {
            let at = graph.tiers().iter().position(|t| t == child).expect("child listed");
            assert!(at < i, "child {child} after parent {tier}");
            assert!(graph.parents(*child).contains(&tier));
        }
    }
    assert!(graph.non_canonical().iter().all(|&t| t >= ALIAS_OFFSET));
}

#[test]
fn self_loops_are_not_cycles() {
    let game = SyntheticGame::builder()
        .tier(0, 2)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 1), tp(0, 0))
        .build()
        .expect("game");
    let graph = build_tier_graph(&game, Limits::default()).expect("graph");
    assert_eq!(graph.tiers(), &[0]);
    assert!(graph.has_self_loop(0));
    assert!(graph.children(0).is_empty());
}

#[test]
fn solve_all_visits_children_first() {
    let game = random_game(4, false, true, true);
    let graph = build_tier_graph(&game, Limits::default()).expect("graph");
    let (_dir, db) = temp_db();
    let mut seen = Vec::new();
    let report = solve_all(&game, &db, &options(Strategy::Auto), None, |t| seen.push(t)).expect("solve_all");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.processed, graph.len());
    assert_eq!(seen.len(), graph.len());
    for (i, &tier) in seen.iter().enumerate() {
        assert_eq!(db.tier_status(tier), TierStatus::Solved);
        for child in graph.children(tier) {
            assert!(seen[..i].contains(child), "tier {tier} solved before its child {child}");
        }
    }

    let again = solve_all(&game, &db, &options(Strategy::Auto), None, |_| {}).expect("again");
    assert_eq!((again.processed, again.skipped), (0, graph.len()));
}

#[test]
fn failed_tiers_block_their_parents() {
    // 3 -> {2, 4}, 2 -> 1 -> 0. Position 1 of tier 0 has no moves and is not
    // primitive, so tier 0 fails; tier 4 is independent.
    let game = SyntheticGame::builder()
        .tier(0, 2)
        .tier(1, 1)
        .tier(2, 1)
        .tier(3, 1)
        .tier(4, 1)
        .primitive(tp(0, 0), Value::Lose)
        .edge(tp(1, 0), tp(0, 0))
        .edge(tp(2, 0), tp(1, 0))
        .edge(tp(3, 0), tp(2, 0))
        .edge(tp(3, 0), tp(4, 0))
        .primitive(tp(4, 0), Value::Win)
        .initial(tp(3, 0))
        .build()
        .expect("game");
    let (_dir, db) = temp_db();
    let report = solve_all(&game, &db, &options(Strategy::Frontier), None, |_| {}).expect("solve_all");
    assert_eq!((report.processed, report.failed, report.blocked), (1, 1, 3));
    assert!(!report.is_success());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, 0);
    assert_eq!(db.tier_status(4), TierStatus::Solved);
    for tier in 0..4 {
        assert_eq!(db.tier_status(tier), TierStatus::Missing, "tier {tier}");
    }
}

#[test]
fn oversized_adapter_output_fails_the_tier() {
    let game = SyntheticGame::builder()
        .tier(0, 3)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 2))
        .primitive(tp(0, 1), Value::Lose)
        .primitive(tp(0, 2), Value::Lose)
        .build()
        .expect("game");
    let opts = SolveOptions { limits: Limits { child_positions: 1, ..Limits::default() }, ..options(Strategy::Frontier) };
    let (_dir, db) = temp_db();
    let report = solve_all(&game, &db, &opts, None, |_| {}).expect("solve_all");
    assert_eq!(report.failed, 1);
    assert!(report.errors[0].1.contains("child positions"), "{:?}", report.errors);
}

#[test]
fn move_limit_applies_to_every_strategy() {
    // Two moves from 0 land on the same child.
    let game = SyntheticGame::builder()
        .tier(0, 2)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 1))
        .primitive(tp(0, 1), Value::Lose)
        .build()
        .expect("game");
    for strategy in [Strategy::Frontier, Strategy::DirectUpdate, Strategy::ValueIteration] {
        let opts = SolveOptions { limits: Limits { moves: 1, ..Limits::default() }, ..options(strategy) };
        let (_dir, db) = temp_db();
        let report = solve_all(&game, &db, &opts, None, |_| {}).expect("solve_all");
        assert_eq!(report.failed, 1, "{strategy:?}");
        assert!(report.errors[0].1.contains("moves exceeded capacity"), "{strategy:?}: {:?}", report.errors);
        assert_eq!(db.tier_status(0), TierStatus::Missing);

        let (_dir, db) = temp_db();
        let report = solve_all(&game, &db, &options(strategy), None, |_| {}).expect("solve_all");
        assert!(report.is_success(), "{strategy:?}: {report:?}");
    }
}

#[test]
fn analyze_all_covers_every_tier() {
    let game = random_game(6, true, false, true);
    let graph = build_tier_graph(&game, Limits::default()).expect("graph");
    let (_dir, db) = solve_with(&game, Strategy::Auto);
    let mut count = 0;
    let report = analyze_all(&game, &db, &options(Strategy::Auto), |_| count += 1).expect("analyze_all");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(count, graph.len());
    for &tier in graph.tiers() {
        assert_eq!(db.analysis_status(tier), TierStatus::Solved, "tier {tier}");
    }
}
