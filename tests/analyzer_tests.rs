mod common;

use common::{options, random_game, solve_with, temp_db, tp};
use tiersolve::{
    analyze_all, analyze_tier, discover_tier, solve_tier, Database, SolveOptions, Strategy, SyntheticGame, TierGame,
    TierStatus, Value,
};

/// One tier holding a complete binary tree: position `p < 127` moves to
/// `2p + 1` and `2p + 2`; positions 127..=255 are primitive losses. Only
/// position 255 is unreachable from the root.
fn tree() -> SyntheticGame {
    let mut builder = SyntheticGame::builder().tier(0, 256);
    for p in 0..127 {
        builder = builder.edge(tp(0, p), tp(0, 2 * p + 1)).edge(tp(0, p), tp(0, 2 * p + 2));
    }
    for p in 127..256 {
        builder = builder.primitive(tp(0, p), Value::Lose);
    }
    builder.initial(tp(0, 0)).build().expect("tree")
}

#[test]
fn discovery_marks_exactly_the_reachable_positions() {
    let game = tree();
    let (_dir, db) = temp_db();
    let found = discover_tier(&game, &db, 0, &options(Strategy::Auto)).expect("discover");
    assert_eq!(found.tier, 0);
    assert_eq!(found.map.count_ones(), 255);
    assert_eq!(found.map.ones().last(), Some(254));
    assert_eq!(found.sweeps, 8, "one sweep per tree level");
    assert_eq!(found.fallback_sweeps, 0);
    assert!(found.child_maps.is_empty());
}

#[test]
fn discovery_falls_back_to_bits_when_the_pool_is_small() {
    let game = tree();
    let (_a, unlimited_db) = temp_db();
    let unlimited = discover_tier(&game, &unlimited_db, 0, &options(Strategy::Auto)).expect("unlimited");

    // Three bitsets of 32 bytes plus room for two small fringe arrays.
    let tight = SolveOptions { memlimit_bytes: Some(160), ..options(Strategy::Auto) };
    let (_b, limited_db) = temp_db();
    let limited = discover_tier(&game, &limited_db, 0, &tight).expect("limited");

    assert!(limited.fallback_sweeps >= 1, "{} sweeps, none fell back", limited.sweeps);
    assert_eq!(limited.map.ones().collect::<Vec<_>>(), unlimited.map.ones().collect::<Vec<_>>());
}

#[test]
fn discovery_is_out_of_memory_when_maps_do_not_fit() {
    let game = tree();
    let (_dir, db) = temp_db();
    let opts = SolveOptions { memlimit_bytes: Some(40), ..options(Strategy::Auto) };
    assert!(matches!(
        discover_tier(&game, &db, 0, &opts),
        Err(tiersolve::SolverError::OutOfMemory { .. })
    ));
}

#[test]
fn analysis_counts_reachable_outcomes() {
    let game = tree();
    let (_dir, db) = temp_db();
    let opts = options(Strategy::Frontier);
    solve_tier(&game, &db, 0, &opts, None).expect("solve");

    let analysis = analyze_tier(&game, &db, 0, &opts).expect("analyze").expect("fresh analysis");
    assert_eq!(analysis.reachable, 255);
    // Leaves at depth 7 lose; levels alternate upwards.
    assert_eq!(analysis.count_of(Value::Lose), 2 + 8 + 32 + 128);
    assert_eq!(analysis.count_of(Value::Win), 1 + 4 + 16 + 64);
    assert_eq!(analysis.max_remoteness[Value::Win as usize], 7);
    assert_eq!(analysis.max_remoteness[Value::Lose as usize], 6);
    assert_eq!(analysis.total_moves, 254);
    assert_eq!(analysis.max_moves, 2);
    assert_eq!(analysis.sweeps, 8);
    assert_eq!(db.analysis_status(0), TierStatus::Solved);
    assert_eq!(db.load_analysis(0).expect("stored"), analysis);

    assert!(analyze_tier(&game, &db, 0, &opts).expect("again").is_none(), "stored analyses are kept");
    let forced = SolveOptions { force: true, ..opts };
    assert!(analyze_tier(&game, &db, 0, &forced).expect("forced").is_some());
}

#[test]
fn analyze_all_walks_parents_first() {
    let game = random_game(3, true, true, true);
    let (_dir, db) = solve_with(&game, Strategy::Frontier);
    let mut order = Vec::new();
    let report = analyze_all(&game, &db, &options(Strategy::Frontier), |t| order.push(t)).expect("analyze_all");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(order.first().copied(), Some(game.initial_tier()));

    let initial = db.load_analysis(game.initial_tier()).expect("root analysis");
    assert!(initial.reachable >= 1);
    for &tier in &order {
        let a = db.load_analysis(tier).expect("analysis");
        assert!(a.reachable <= a.tier_size);
        assert_eq!(a.value_counts.iter().sum::<u64>(), a.reachable);
        assert_eq!(a.count_of(Value::Undecided), 0, "tier {tier}: reachable positions are all solved");
    }
}

#[test]
fn symmetric_positions_are_counted_once() {
    // 0 moves to 1 and 2, and 2 is a symmetric copy of 1.
    let game = SyntheticGame::builder()
        .tier(0, 4)
        .edge(tp(0, 0), tp(0, 1))
        .edge(tp(0, 0), tp(0, 2))
        .primitive(tp(0, 1), Value::Lose)
        .primitive(tp(0, 2), Value::Lose)
        .canonical(tp(0, 2), 1)
        .initial(tp(0, 0))
        .build()
        .expect("game");
    let (_dir, db) = temp_db();
    let opts = options(Strategy::Frontier);
    solve_tier(&game, &db, 0, &opts, None).expect("solve");

    let analysis = analyze_tier(&game, &db, 0, &opts).expect("analyze").expect("fresh analysis");
    assert_eq!(analysis.reachable, 2);
    assert_eq!(analysis.count_of(Value::Win), 1);
    assert_eq!(analysis.count_of(Value::Lose), 1);
    assert_eq!(analysis.total_moves, 2);
    let stored = serde_json::to_value(&analysis).expect("json");
    assert!(stored.get("reachable").is_some());
    assert!(stored.get("canonical").is_none(), "{stored}");
}
