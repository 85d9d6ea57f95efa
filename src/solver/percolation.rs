// Backward induction by frontier propagation.
//
//   1. load every child tier's decided positions into win/lose/tie frontiers
//   2. scan the tier: primitives join the frontiers, everything else gets a
//      count of its canonical children
//   3. for r = 0, 1, ...: push win then lose positions at r to their parents,
//      then the same for ties
//   4. whatever still waits on children is a draw
//
// Because remotenesses are pushed in ascending order, the first push that
// decides a parent does so at its final remoteness.

use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::config::SolveOptions;
use crate::db::{Database, RecordArray};
use crate::error::{Result, SolverError};
use crate::game::{Checked, TierGame};
use crate::memory::{Allocator, TrackedVec};
use crate::solver::counters::ChildCounters;
use crate::solver::frontier::Frontier;
use crate::solver::reverse_graph::{EdgeList, ReverseGraph};
use crate::solver::{positions, save_and_compare, skip_solved, ParentSource, TierLayout};
use crate::types::{Position, Remoteness, Tier, TierPosition, Value, REMOTENESS_MAX};

const TAG: &str = "bi";

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
    let mut worker = Percolation::new(Checked::new(game, options.limits), db, tier, options)?;
    worker.load_children()?;
    worker.scan_tier()?;
    worker.push_frontier_up()?;
    worker.mark_draws();
    save_and_compare(db, &worker.records, options, reference, TAG)?;
    info!(
        "[{TAG}] tier {tier} solved: {} positions in {:.2?}, peak pool use {} bytes",
        worker.layout.size,
        started.elapsed(),
        worker.peak_memory
    );
    Ok(true)
}

/// Newly decided positions gathered by one task, by value.
struct Found {
    win: TrackedVec<(Position, Remoteness)>,
    lose: TrackedVec<(Position, Remoteness)>,
    tie: TrackedVec<(Position, Remoteness)>,
}

impl Found {
    fn new(allocator: &Allocator) -> Self {
        Self { win: TrackedVec::new(allocator), lose: TrackedVec::new(allocator), tie: TrackedVec::new(allocator) }
    }

    fn push(&mut self, value: Value, position: Position, remoteness: Remoteness) -> Result<()> {
        match value {
            Value::Win => self.win.push((position, remoteness)),
            Value::Lose => self.lose.push((position, remoteness)),
            Value::Tie => self.tie.push((position, remoteness)),
            Value::Draw | Value::Undecided => Ok(()),
        }
    }

    fn len(&self) -> usize {
        self.win.len() + self.lose.len() + self.tie.len()
    }
}

struct Percolation<'a, G: ?Sized> {
    game: Checked<'a, G>,
    db: &'a dyn Database,
    options: &'a SolveOptions,
    allocator: Allocator,
    layout: TierLayout,
    records: RecordArray,
    counters: ChildCounters,
    win: Frontier,
    lose: Frontier,
    tie: Frontier,
    reverse: Option<ReverseGraph>,
    peak_memory: usize,
}

impl<'a, G: TierGame + ?Sized> Percolation<'a, G> {
    fn new(game: Checked<'a, G>, db: &'a dyn Database, tier: Tier, options: &'a SolveOptions) -> Result<Self> {
        let allocator = options.allocator();
        let layout = TierLayout::new(&game, tier)?;
        let n = layout.num_indices();
        let win = Frontier::new(n, &allocator);
        let lose = Frontier::new(n, &allocator);
        let tie = Frontier::new(n, &allocator);
        let records = RecordArray::new(tier, layout.size, &allocator)?;
        let counters = ChildCounters::new(layout.size, &allocator)?;
        debug!("[{TAG}] tier {tier}: size {}, {} child tiers", layout.size, layout.children.len());
        Ok(Self {
            game,
            db,
            options,
            allocator,
            layout,
            records,
            counters,
            win,
            lose,
            tie,
            reverse: None,
            peak_memory: 0,
        })
    }

    fn note_memory(&mut self) {
        self.peak_memory = self.peak_memory.max(self.allocator.in_use());
    }

    fn merge(&mut self, found: Vec<Found>, index: usize) -> Result<usize> {
        let mut total = 0;
        for f in found {
            total += f.len();
            for &(p, r) in f.win.iter() {
                self.win.add(p, r, index)?;
            }
            for &(p, r) in f.lose.iter() {
                self.lose.add(p, r, index)?;
            }
            for &(p, r) in f.tie.iter() {
                self.tie.add(p, r, index)?;
            }
        }
        self.note_memory();
        Ok(total)
    }

    /// Child tiers are loaded one after another so that divider indices stay grouped.
    fn load_children(&mut self) -> Result<()> {
        for index in 0..self.layout.children.len() {
            let child = self.layout.children[index];
            let game = self.game.game;
            let stored = game.canonical_tier(child);
            let size = game.tier_size(stored);
            let db = self.db;
            let allocator = &self.allocator;

            let found = positions(size, self.options.min_chunk())
                .try_fold(
                    || (db.probe(), Found::new(allocator)),
                    |(mut probe, mut found), pos| {
                        let record = probe.record(TierPosition::new(stored, pos))?;
                        let value = record.value();
                        if matches!(value, Value::Win | Value::Lose | Value::Tie) {
                            let position = if stored == child {
                                pos
                            } else {
                                game.position_in_symmetric_tier(TierPosition::new(stored, pos), child)
                            };
                            found.push(value, position, record.remoteness())?;
                        }
                        Ok::<_, SolverError>((probe, found))
                    },
                )
                .map(|acc| acc.map(|(_, found)| found))
                .collect::<Result<Vec<_>>>()?;
            let loaded = self.merge(found, index)?;
            debug!("[{TAG}] tier {}: loaded {loaded} frontier positions from child tier {child}", self.layout.tier);
        }
        Ok(())
    }

    fn scan_tier(&mut self) -> Result<()> {
        let tier = self.layout.tier;
        let game = self.game;
        let layout = &self.layout;
        let records = &self.records;
        let counters = &self.counters;
        let allocator = &self.allocator;
        let build_reverse = !game.game.has_parent_positions();

        let locals = positions(layout.size, self.options.min_chunk())
            .try_fold(
                || (Found::new(allocator), EdgeList::new(allocator)),
                |(mut found, mut edges), pos| -> Result<(Found, EdgeList)> {
                    let tp = TierPosition::new(tier, pos);
                    if !game.is_solvable(tp) {
                        counters.mark_illegal(pos);
                        return Ok((found, edges));
                    }
                    let value = game.game.primitive(tp);
                    if value != Value::Undecided {
                        records.set_value_remoteness(pos, value, 0);
                        found.push(value, pos, 0)?;
                        return Ok((found, edges));
                    }
                    let children = game.canonical_children(tp)?;
                    if children.is_empty() {
                        return Err(SolverError::adapter(tier, pos, "non-primitive position has no moves"));
                    }
                    for &child in &children {
                        layout.check_child(tp, child)?;
                        if build_reverse {
                            edges.push((child, pos))?;
                        }
                    }
                    counters.set(pos, children.len() as u32);
                    Ok((found, edges))
                },
            )
            .collect::<Result<Vec<_>>>()?;

        let (found, edges): (Vec<Found>, Vec<EdgeList>) = locals.into_iter().unzip();
        let primitives = self.merge(found, self.layout.this_index())?;
        if build_reverse {
            let graph = ReverseGraph::build(&self.layout.all_tiers(), &edges, &self.allocator)?;
            debug!("[{TAG}] tier {tier}: reverse graph with {} edges", graph.num_edges());
            self.reverse = Some(graph);
        }
        drop(edges);
        self.note_memory();

        self.win.accumulate_dividers();
        self.lose.accumulate_dividers();
        self.tie.accumulate_dividers();
        debug!("[{TAG}] tier {tier}: {primitives} primitive positions");
        Ok(())
    }

    fn push_frontier_up(&mut self) -> Result<()> {
        for r in 0..=REMOTENESS_MAX {
            self.push_bucket(Value::Win, r)?;
            self.push_bucket(Value::Lose, r)?;
        }
        for r in 0..=REMOTENESS_MAX {
            self.push_bucket(Value::Tie, r)?;
        }
        self.reverse = None;
        Ok(())
    }

    /// Pushes every `child_value` position at remoteness `r` to its parents.
    fn push_bucket(&mut self, child_value: Value, r: Remoteness) -> Result<()> {
        let found = {
            let frontier = match child_value {
                Value::Win => &self.win,
                Value::Lose => &self.lose,
                _ => &self.tie,
            };
            if frontier.is_empty(r) {
                return Ok(());
            }
            let parent_r = SolverError::check_remoteness(usize::from(r) + 1)?;
            let parent_value = match child_value {
                Value::Win => Value::Lose,
                Value::Lose => Value::Win,
                _ => Value::Tie,
            };
            let tier = self.layout.tier;
            let size = self.layout.size;
            let game = self.game;
            let records = &self.records;
            let counters = &self.counters;
            let allocator = &self.allocator;
            let source = match &self.reverse {
                Some(graph) => ParentSource::Graph(graph),
                None => ParentSource::Game,
            };

            let mut found = Vec::new();
            for (index, slice) in frontier.segments(r) {
                let child_tier = self.layout.tier_at(index);
                let locals = slice
                    .par_iter()
                    .with_min_len(64)
                    .try_fold(
                        || TrackedVec::new(allocator),
                        |mut local, &pos| -> Result<TrackedVec<Position>> {
                            let child = TierPosition::new(child_tier, pos);
                            for &parent in source.parents(&game, child, tier)?.iter() {
                                if parent >= size {
                                    return Err(SolverError::adapter(
                                        child.tier,
                                        child.position,
                                        format!("parent {parent} outside tier {tier}"),
                                    ));
                                }
                                let decided = if child_value == Value::Win {
                                    // Only the last winning child proves the parent lost.
                                    counters.decrement_if_nonzero(parent) == 1
                                } else {
                                    counters.take(parent) > 0
                                };
                                if decided {
                                    records.set_value_remoteness(parent, parent_value, parent_r);
                                    local.push(parent)?;
                                }
                            }
                            Ok(local)
                        },
                    )
                    .collect::<Result<Vec<_>>>()?;
                found.extend(locals);
            }
            (found, parent_value, parent_r)
        };

        let (found, parent_value, parent_r) = found;
        match child_value {
            Value::Win => self.win.free_remoteness(r),
            Value::Lose => self.lose.free_remoteness(r),
            _ => self.tie.free_remoteness(r),
        }
        let index = self.layout.this_index();
        let dest = match parent_value {
            Value::Win => &mut self.win,
            Value::Lose => &mut self.lose,
            _ => &mut self.tie,
        };
        for local in &found {
            for &p in local.iter() {
                dest.add(p, parent_r, index)?;
            }
        }
        drop(found);
        self.note_memory();
        Ok(())
    }

    fn mark_draws(&self) {
        let records = &self.records;
        let counters = &self.counters;
        positions(self.layout.size, self.options.min_chunk()).for_each(|pos| {
            if counters.is_pending(pos) {
                records.set_value_remoteness(pos, Value::Draw, 0);
            }
        });
    }
}
