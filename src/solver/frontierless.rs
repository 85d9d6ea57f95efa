// Backward induction without frontiers.
//
// Instead of queueing decided positions per remoteness, every round rescans
// the solving tier for records at the current remoteness and pushes them to
// their parents in place. Memory use is the record array, the counters and,
// for games without a parents API, a reverse graph of in-tier edges only.
//
// Counters hold the number of in-tier children. Out-of-tier children are
// folded into the records up front with `maximize`, which leaves each
// position with the best outcome its child tiers can offer.

use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::concurrency::{ConcurrentBool, ConcurrentInt};
use crate::config::SolveOptions;
use crate::db::{Database, RecordArray};
use crate::error::{Result, SolverError};
use crate::game::{Checked, TierGame};
use crate::memory::Allocator;
use crate::solver::counters::ChildCounters;
use crate::solver::reverse_graph::{EdgeList, ReverseGraph};
use crate::solver::{
    deduce_parent, positions, save_and_compare, skip_solved, stored_position, ParentSource, TierLayout,
};
use crate::types::{Position, Remoteness, Tier, TierPosition, Value};

const TAG: &str = "bi2";

pub fn solve<G: TierGame + ?Sized>(
    game: &G,
    db: &dyn Database,
    tier: Tier,
    options: &SolveOptions,
    reference: Option<&dyn Database>,
) -> Result<bool> {
    if skip_solved(db, tier, options, TAG) {
        return Ok(false);
    }
    let started = Instant::now();
    let mut worker = DirectUpdate::new(Checked::new(game, options.limits), db, tier, options)?;
    worker.scan_tier()?;
    if worker.game.game.has_parent_positions() {
        worker.push_child_tiers()?;
    }
    worker.iterate(&[Value::Win, Value::Lose])?;
    worker.iterate(&[Value::Tie])?;
    worker.mark_draws();
    save_and_compare(db, &worker.records, options, reference, TAG)?;
    info!("[{TAG}] tier {tier} solved: {} positions in {:.2?}", worker.layout.size, started.elapsed());
    Ok(true)
}

struct DirectUpdate<'a, G: ?Sized> {
    game: Checked<'a, G>,
    db: &'a dyn Database,
    options: &'a SolveOptions,
    allocator: Allocator,
    layout: TierLayout,
    records: RecordArray,
    counters: ChildCounters,
    reverse: Option<ReverseGraph>,
    /// Largest remoteness deduced so far, per phase. -1 while nothing is known.
    max_win_lose: ConcurrentInt,
    max_tie: ConcurrentInt,
}

impl<'a, G: TierGame + ?Sized> DirectUpdate<'a, G> {
    fn new(game: Checked<'a, G>, db: &'a dyn Database, tier: Tier, options: &'a SolveOptions) -> Result<Self> {
        let allocator = options.allocator();
        let layout = TierLayout::new(&game, tier)?;
        let records = RecordArray::new(tier, layout.size, &allocator)?;
        let counters = ChildCounters::new(layout.size, &allocator)?;
        Ok(Self {
            game,
            db,
            options,
            allocator,
            layout,
            records,
            counters,
            reverse: None,
            max_win_lose: ConcurrentInt::new(-1),
            max_tie: ConcurrentInt::new(-1),
        })
    }

    /// Raises `position` to `(value, remoteness)` and tracks the loop bounds.
    fn improve(&self, position: Position, value: Value, remoteness: Remoteness) -> bool {
        let changed = self.records.maximize(position, value, remoteness);
        if changed {
            match value {
                Value::Win | Value::Lose => {
                    self.max_win_lose.maximize(i64::from(remoteness));
                }
                Value::Tie => {
                    self.max_tie.maximize(i64::from(remoteness));
                }
                Value::Draw | Value::Undecided => {}
            }
        }
        changed
    }

    fn scan_tier(&mut self) -> Result<()> {
        let tier = self.layout.tier;
        let game = self.game;
        let layout = &self.layout;
        let counters = &self.counters;
        let allocator = &self.allocator;
        let db = self.db;
        let pull = !game.game.has_parent_positions();
        let this = &*self;

        let edges = positions(layout.size, self.options.min_chunk())
            .try_fold(
                || (EdgeList::new(allocator), db.probe()),
                |(mut edges, mut probe), pos| {
                    let tp = TierPosition::new(tier, pos);
                    if !game.is_solvable(tp) {
                        counters.mark_illegal(pos);
                        return Ok::<_, SolverError>((edges, probe));
                    }
                    let value = game.game.primitive(tp);
                    if value != Value::Undecided {
                        this.improve(pos, value, 0);
                        counters.mark_illegal(pos);
                        return Ok((edges, probe));
                    }
                    let children = game.canonical_children(tp)?;
                    if children.is_empty() {
                        return Err(SolverError::adapter(tier, pos, "non-primitive position has no moves"));
                    }
                    let mut in_tier = 0u32;
                    for &child in &children {
                        layout.check_child(tp, child)?;
                        if child.tier == tier {
                            in_tier += 1;
                            if pull {
                                edges.push((child, pos))?;
                            }
                        } else if pull {
                            let record = probe.record(stored_position(game.game, child))?;
                            if let Some((v, r)) = deduce_parent(record.value(), record.remoteness())? {
                                this.improve(pos, v, r);
                            }
                        }
                    }
                    counters.set(pos, in_tier);
                    Ok((edges, probe))
                },
            )
            .map(|acc| acc.map(|(edges, _)| edges))
            .collect::<Result<Vec<_>>>()?;

        if pull {
            let graph = ReverseGraph::build(&[(tier, self.layout.size)], &edges, &self.allocator)?;
            debug!("[{TAG}] tier {tier}: reverse graph with {} in-tier edges", graph.num_edges());
            self.reverse = Some(graph);
        }
        Ok(())
    }

    /// Pushes every decided position of every child tier to its parents in
    /// the solving tier.
    fn push_child_tiers(&self) -> Result<()> {
        let tier = self.layout.tier;
        let size = self.layout.size;
        let game = self.game;
        let db = self.db;
        let counters = &self.counters;

        for &child_tier in &self.layout.children {
            let stored = game.game.canonical_tier(child_tier);
            positions(game.game.tier_size(stored), self.options.min_chunk()).try_for_each_init(
                || db.probe(),
                |probe, pos| -> Result<()> {
                    let record = probe.record(TierPosition::new(stored, pos))?;
                    let Some((value, remoteness)) = deduce_parent(record.value(), record.remoteness())? else {
                        return Ok(());
                    };
                    let position = if stored == child_tier {
                        pos
                    } else {
                        game.game.position_in_symmetric_tier(TierPosition::new(stored, pos), child_tier)
                    };
                    let child = TierPosition::new(child_tier, position);
                    for parent in game.parents(child, tier)? {
                        if parent >= size {
                            return Err(SolverError::adapter(
                                child.tier,
                                child.position,
                                format!("parent {parent} outside tier {tier}"),
                            ));
                        }
                        if !counters.is_illegal(parent) {
                            self.improve(parent, value, remoteness);
                        }
                    }
                    Ok(())
                },
            )?;
            debug!("[{TAG}] tier {tier}: pushed child tier {child_tier}");
        }
        Ok(())
    }

    /// Runs propagation rounds, one remoteness per round, until no round can
    /// produce anything new. Each round makes one pass per entry of `values`,
    /// in order, so every win at `r` has reached its parents before any loss
    /// at `r` is read.
    fn iterate(&self, values: &[Value]) -> Result<()> {
        let bound = if values.contains(&Value::Tie) { &self.max_tie } else { &self.max_win_lose };
        let mut r: Remoteness = 0;
        let mut advanced = false;
        while i64::from(r) <= bound.load() || advanced {
            advanced = false;
            for &value in values {
                advanced |= self.propagate(value, r)?;
            }
            r += 1;
        }
        debug!("[{TAG}] tier {}: {values:?} rounds finished at remoteness {r}", self.layout.tier);
        Ok(())
    }

    /// Pushes `value` records at remoteness `r` one step up. Returns true if
    /// any parent changed.
    fn propagate(&self, value: Value, r: Remoteness) -> Result<bool> {
        let tier = self.layout.tier;
        let size = self.layout.size;
        let records = &self.records;
        let counters = &self.counters;
        let game = self.game;
        let source = match &self.reverse {
            Some(graph) => ParentSource::Graph(graph),
            None => ParentSource::Game,
        };
        let advanced = ConcurrentBool::new(false);

        positions(size, self.options.min_chunk()).try_for_each(|pos| -> Result<()> {
            let (found, remoteness) = records.get(pos).outcome();
            if remoteness != r || found != value {
                return Ok(());
            }
            match value {
                // A win or a tie is final once its round comes; stop waiting on children.
                Value::Win | Value::Tie => {
                    counters.take(pos);
                }
                Value::Lose if counters.is_pending(pos) => return Ok(()),
                _ => {}
            }
            let child = TierPosition::new(tier, pos);
            let parents = source.parents(&game, child, tier)?;
            if parents.is_empty() {
                return Ok(());
            }
            let next = SolverError::check_remoteness(usize::from(r) + 1)?;
            for &parent in parents.iter() {
                if parent >= size {
                    return Err(SolverError::adapter(tier, pos, format!("parent {parent} outside tier {tier}")));
                }
                let changed = match value {
                    Value::Win => counters.decrement_if_nonzero(parent) == 1 && self.improve(parent, Value::Lose, next),
                    Value::Lose => counters.take(parent) > 0 && self.improve(parent, Value::Win, next),
                    _ => counters.take(parent) > 0 && self.improve(parent, Value::Tie, next),
                };
                if changed {
                    advanced.store(true);
                }
            }
            Ok(())
        })?;
        Ok(advanced.load())
    }

    fn mark_draws(&self) {
        positions(self.layout.size, self.options.min_chunk()).for_each(|pos| {
            if self.counters.is_pending(pos) {
                self.records.maximize(pos, Value::Draw, 0);
            }
        });
    }
}
