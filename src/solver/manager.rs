// Tier-graph driver.
//
// Builds the graph of canonical tiers reachable from the initial tier and
// runs a per-tier job over it in dependency order: solving goes from the
// leaves up (a tier after all of its children), analysis from the root down
// (a tier after all of its parents). A failed tier blocks everything that
// depends on it; independent tiers still run.

use std::collections::VecDeque;

use log::{error, info};

use crate::concurrency::num_threads;
use crate::config::{Limits, SolveOptions};
use crate::db::Database;
use crate::error::{Result, SolverError, TestFailure};
use crate::game::{Checked, TierGame};
use crate::solver::{analyze_tier, selftest, solve_tier, FastMap};
use crate::types::Tier;

const TAG: &str = "manager";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Canonical tiers reachable from the initial tier and the moves between them.
#[derive(Debug, Default)]
pub struct TierGraph {
    root: Tier,
    /// Children before parents.
    order: Vec<Tier>,
    children: FastMap<Tier, Vec<Tier>>,
    parents: FastMap<Tier, Vec<Tier>>,
    self_loops: Vec<Tier>,
    non_canonical: Vec<Tier>,
}

impl TierGraph {
    #[inline]
    pub fn root(&self) -> Tier {
        self.root
    }

    /// Every canonical tier, children before parents.
    #[inline]
    pub fn tiers(&self) -> &[Tier] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, tier: Tier) -> bool {
        self.children.contains_key(&tier)
    }

    /// Distinct canonical child tiers, sorted, without `tier` itself.
    pub fn children(&self, tier: Tier) -> &[Tier] {
        self.children.get(&tier).map_or(&[], Vec::as_slice)
    }

    pub fn parents(&self, tier: Tier) -> &[Tier] {
        self.parents.get(&tier).map_or(&[], Vec::as_slice)
    }

    /// True if positions of `tier` can move within `tier`.
    pub fn has_self_loop(&self, tier: Tier) -> bool {
        self.self_loops.contains(&tier)
    }

    /// Non-canonical tiers met while walking the graph. They are never solved.
    pub fn non_canonical(&self) -> &[Tier] {
        &self.non_canonical
    }
}

/// Walks the tier graph from the initial tier. A cycle through two or more
/// distinct tiers is an error; a tier moving into itself is not.
pub fn build_tier_graph<G: TierGame + ?Sized>(game: &G, limits: Limits) -> Result<TierGraph> {
    let checked = Checked::new(game, limits);
    let root = game.canonical_tier(game.initial_tier());
    let mut graph = TierGraph { root, ..TierGraph::default() };
    let mut marks: FastMap<Tier, Mark> = FastMap::default();

    let expand = |tier: Tier, graph: &mut TierGraph| -> Result<Vec<Tier>> {
        let mut children = Vec::new();
        for child in checked.child_tiers(tier)? {
            let canonical = game.canonical_tier(child);
            if canonical != child && !graph.non_canonical.contains(&child) {
                graph.non_canonical.push(child);
            }
            if canonical == tier {
                if !graph.self_loops.contains(&tier) {
                    graph.self_loops.push(tier);
                }
            } else if !children.contains(&canonical) {
                children.push(canonical);
            }
        }
        children.sort_unstable();
        graph.children.insert(tier, children.clone());
        for &c in &children {
            graph.parents.entry(c).or_default().push(tier);
        }
        Ok(children)
    };

    // (tier, its children, index of the next child to visit)
    let mut stack: Vec<(Tier, Vec<Tier>, usize)> = Vec::new();
    marks.insert(root, Mark::InProgress);
    stack.push((root, expand(root, &mut graph)?, 0));
    while let Some((tier, children, next)) = stack.last_mut() {
        let Some(&child) = children.get(*next) else {
            marks.insert(*tier, Mark::Done);
            graph.order.push(*tier);
            stack.pop();
            continue;
        };
        *next += 1;
        match marks.get(&child) {
            Some(Mark::Done) => {}
            Some(Mark::InProgress) => {
                return Err(SolverError::TierGraph(format!("tier {child} is reachable from itself through tier {tier}")));
            }
            None => {
                marks.insert(child, Mark::InProgress);
                let grandchildren = expand(child, &mut graph)?;
                stack.push((child, grandchildren, 0));
            }
        }
    }
    for parents in graph.parents.values_mut() {
        parents.sort_unstable();
    }
    info!(
        "[{TAG}] tier graph: {} canonical tiers, {} non-canonical",
        graph.order.len(),
        graph.non_canonical.len()
    );
    Ok(graph)
}

/// Totals of a multi-tier run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Tiers computed by this run.
    pub processed: usize,
    /// Tiers left alone because they were already done.
    pub skipped: usize,
    pub failed: usize,
    /// Tiers never attempted because something they depend on failed.
    pub blocked: usize,
    pub errors: Vec<(Tier, String)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.blocked == 0
    }
}

/// Runs `job` on every tier once all of its `prerequisites` succeeded.
fn run_in_order(
    graph: &TierGraph,
    prerequisites: impl Fn(Tier) -> usize,
    dependents: impl Fn(Tier) -> Vec<Tier>,
    mut job: impl FnMut(Tier) -> Result<bool>,
) -> RunReport {
    let mut report = RunReport::default();
    let mut waiting: FastMap<Tier, usize> = graph.order.iter().map(|&t| (t, prerequisites(t))).collect();
    let mut initial: Vec<Tier> = waiting.iter().filter(|(_, &n)| n == 0).map(|(&t, _)| t).collect();
    initial.sort_unstable();
    let mut ready: VecDeque<Tier> = initial.into();
    let mut finished = 0usize;

    while let Some(tier) = ready.pop_front() {
        finished += 1;
        match job(tier) {
            Ok(true) => report.processed += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                error!("[{TAG}] tier {tier} failed: {e}");
                report.failed += 1;
                report.errors.push((tier, e.to_string()));
                continue;
            }
        }
        for next in dependents(tier) {
            if let Some(n) = waiting.get_mut(&next) {
                *n -= 1;
                if *n == 0 {
                    ready.push_back(next);
                }
            }
        }
    }
    report.blocked = graph.order.len() - finished;
    report
}

/// Solves every canonical tier reachable from the initial tier, children first.
/// `on_tier` is called after each attempted tier.
pub fn solve_all<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    options: &SolveOptions,
    reference: Option<&dyn Database>,
    mut on_tier: impl FnMut(Tier),
) -> Result<RunReport> {
    let graph = build_tier_graph(game, options.limits)?;
    info!("[{TAG}] solving {} tiers on {} threads", graph.len(), num_threads());
    let report = run_in_order(
        &graph,
        |t| graph.children(t).len(),
        |t| graph.parents(t).to_vec(),
        |t| {
            let result = solve_tier(game, db, t, options, reference);
            on_tier(t);
            result
        },
    );
    info!(
        "[{TAG}] solve finished: {} solved, {} already solved, {} failed, {} blocked",
        report.processed, report.skipped, report.failed, report.blocked
    );
    Ok(report)
}

/// Analyzes every canonical tier, parents first. All tiers must be solved.
pub fn analyze_all<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    options: &SolveOptions,
    mut on_tier: impl FnMut(Tier),
) -> Result<RunReport> {
    let graph = build_tier_graph(game, options.limits)?;
    let report = run_in_order(
        &graph,
        |t| graph.parents(t).len(),
        |t| graph.children(t).to_vec(),
        |t| {
            let result = analyze_tier(game, db, t, options).map(|a| a.is_some());
            on_tier(t);
            result
        },
    );
    info!(
        "[{TAG}] analysis finished: {} analyzed, {} already analyzed, {} failed, {} blocked",
        report.processed, report.skipped, report.failed, report.blocked
    );
    Ok(report)
}

/// Runs the adapter self-test on every canonical tier. Returns the failures.
pub fn test_all<G: TierGame + ?Sized>(game: &G, limits: Limits, seed: u64) -> Result<Vec<(Tier, TestFailure)>> {
    let graph = build_tier_graph(game, limits)?;
    let mut failures = Vec::new();
    for &tier in graph.tiers() {
        let mut parent_tiers = graph.parents(tier).to_vec();
        if graph.has_self_loop(tier) {
            parent_tiers.push(tier);
        }
        if let Some(failure) = selftest::test_tier(game, tier, &parent_tiers, seed ^ tier, limits)? {
            failures.push((tier, failure));
        }
    }
    info!("[{TAG}] self-test finished: {} tiers, {} failures", graph.len(), failures.len());
    Ok(failures)
}
