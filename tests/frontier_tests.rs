use tiersolve::solver::reverse_graph::EdgeList;
use tiersolve::solver::{Frontier, ReverseGraph};
use tiersolve::{Allocator, SolverError, TierPosition};

#[test]
fn frontier_dividers_group_positions_by_source_tier() {
    let pool = Allocator::unbounded();
    let mut f = Frontier::new(3, &pool);
    assert_eq!(f.num_dividers(), 3);
    // index 0 and 1 are child tiers, index 2 is the solving tier.
    f.add(10, 0, 0).expect("add");
    f.add(11, 0, 0).expect("add");
    f.add(20, 0, 1).expect("add");
    f.add(30, 2, 1).expect("add");
    f.add(40, 0, 2).expect("add");
    f.accumulate_dividers();
    f.accumulate_dividers();

    assert_eq!(f.len(0), 4);
    assert_eq!(f.len(1), 0);
    assert!(f.is_empty(1));
    assert_eq!(f.get(0, 2), 20);
    assert_eq!(f.child_index_of(0, 0), 0);
    assert_eq!(f.child_index_of(0, 1), 0);
    assert_eq!(f.child_index_of(0, 2), 1);
    assert_eq!(f.child_index_of(0, 3), 2);

    let segments = f.segments(0);
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0], (0, &[10u64, 11][..]));
    assert_eq!(segments[1], (1, &[20u64][..]));
    assert_eq!(segments[2], (2, &[40u64][..]));
    assert_eq!(f.segments(2), vec![(1, &[30u64][..])]);
}

#[test]
fn frontier_only_takes_solving_tier_after_accumulation() {
    let pool = Allocator::unbounded();
    let mut f = Frontier::new(2, &pool);
    f.add(1, 0, 0).expect("add");
    f.accumulate_dividers();
    assert!(f.add(2, 0, 0).is_err());
    assert!(f.add(2, 0, 5).is_err());
    f.add(3, 0, 1).expect("solving tier");
    f.add(4, 3, 1).expect("solving tier, empty bucket");
    assert_eq!(f.segments(0), vec![(0, &[1u64][..]), (1, &[3u64][..])]);
    assert_eq!(f.segments(3), vec![(1, &[4u64][..])]);
    assert_eq!(f.child_index_of(3, 0), 1);
}

#[test]
fn frontier_free_returns_memory() {
    let pool = Allocator::unbounded();
    let mut f = Frontier::new(1, &pool);
    for p in 0..100 {
        f.add(p, 7, 0).expect("add");
    }
    assert!(pool.in_use() > 0);
    f.accumulate_dividers();
    f.free_remoteness(7);
    assert_eq!(f.len(7), 0);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn frontier_runs_out_of_pool() {
    let pool = Allocator::new(16);
    let mut f = Frontier::new(1, &pool);
    let err = (0..100).try_for_each(|p| f.add(p, 0, 0)).expect_err("pool is tiny");
    assert!(matches!(err, SolverError::OutOfMemory { .. }));
}

fn edges(pool: &Allocator, pairs: &[(TierPosition, u64)]) -> EdgeList {
    let mut list = EdgeList::new(pool);
    for &pair in pairs {
        list.push(pair).expect("push");
    }
    list
}

#[test]
fn reverse_graph_lists_parents_in_input_order() {
    let pool = Allocator::unbounded();
    let child_tier = TierPosition::new;
    let lists = vec![
        edges(&pool, &[(child_tier(5, 1), 0), (child_tier(9, 2), 0)]),
        edges(&pool, &[(child_tier(5, 1), 3), (child_tier(9, 0), 2)]),
    ];
    let graph = ReverseGraph::build(&[(5, 2), (9, 3)], &lists, &pool).expect("build");
    assert_eq!(graph.num_edges(), 4);
    assert_eq!(graph.parents_of(child_tier(5, 1)), &[0, 3]);
    assert_eq!(graph.parents_of(child_tier(5, 0)), &[] as &[u64]);
    assert_eq!(graph.parents_of(child_tier(9, 2)), &[0]);
    assert_eq!(graph.parents_of(child_tier(9, 0)), &[2]);
    assert_eq!(graph.parents_of(child_tier(7, 0)), &[] as &[u64]);
    assert!(pool.in_use() >= ReverseGraph::memory_usage(5, 4));
}

#[test]
fn reverse_graph_rejects_unknown_children() {
    let pool = Allocator::unbounded();
    let lists = vec![edges(&pool, &[(TierPosition::new(5, 2), 0)])];
    let err = ReverseGraph::build(&[(5, 2)], &lists, &pool).expect_err("position 2 is outside tier 5");
    assert!(matches!(err, SolverError::Adapter { .. }));
}

#[test]
fn reverse_graph_build_charges_the_write_cursor() {
    let unbounded = Allocator::unbounded();
    let lists = vec![
        edges(&unbounded, &[(TierPosition::new(5, 1), 0), (TierPosition::new(9, 2), 0)]),
        edges(&unbounded, &[(TierPosition::new(5, 1), 3), (TierPosition::new(9, 0), 2)]),
    ];
    let tiers = [(5, 2), (9, 3)];

    let tight = Allocator::new(ReverseGraph::memory_usage(5, 4));
    let err = ReverseGraph::build(&tiers, &lists, &tight).expect_err("cursor does not fit");
    assert!(matches!(err, SolverError::OutOfMemory { .. }), "{err:?}");
    assert_eq!(tight.in_use(), 0);

    let pool = Allocator::new(ReverseGraph::build_usage(5, 4));
    let graph = ReverseGraph::build(&tiers, &lists, &pool).expect("build");
    assert_eq!(pool.in_use(), ReverseGraph::memory_usage(5, 4));
    drop(graph);
    assert_eq!(pool.in_use(), 0);
}
