// Value iteration over one tier, resumable from checkpoints.
//
// Child tiers are loaded whole. Each win/lose round `i` decides the positions
// whose outcome is exactly `i` moves away; tie rounds follow, then every
// position still undecided is a draw. Rounds only read child records that
// earlier rounds finalized, so a run resumed from any checkpoint produces
// exactly the records an uninterrupted run would.

use std::time::{Duration, Instant};

use log::{debug, info};
use rayon::prelude::*;

use crate::concurrency::ConcurrentBool;
use crate::config::{CheckpointPolicy, SolveOptions};
use crate::db::{CheckpointStatus, Database, Record, RecordArray};
use crate::error::{Result, SolverError};
use crate::game::{Checked, TierGame};
use crate::solver::{positions, save_and_compare, skip_solved, stored_position, FastMap, TierLayout};
use crate::types::{Remoteness, Tier, TierPosition, Value, REMOTENESS_MAX};

const TAG: &str = "vi";

/// Where a value-iteration run stands. Each variant names the work still to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    NotStarted,
    ScanningTier,
    IteratingWinLose(Remoteness),
    IteratingTie(Remoteness),
    MarkingDraw,
    Done,
}

impl Step {
    fn to_status(self) -> CheckpointStatus {
        let (step, remoteness) = match self {
            Step::NotStarted => (0, 0),
            Step::ScanningTier => (1, 0),
            Step::IteratingWinLose(i) => (2, i32::from(i)),
            Step::IteratingTie(i) => (3, i32::from(i)),
            Step::MarkingDraw => (4, 0),
            Step::Done => (5, 0),
        };
        CheckpointStatus { step, remoteness }
    }

    fn from_status(status: CheckpointStatus) -> Result<Self> {
        let remoteness = || {
            usize::try_from(status.remoteness)
                .map_err(|_| SolverError::Runtime(format!("negative checkpoint remoteness {}", status.remoteness)))
                .and_then(SolverError::check_remoteness)
        };
        Ok(match status.step {
            0 => Step::NotStarted,
            1 => Step::ScanningTier,
            2 => Step::IteratingWinLose(remoteness()?),
            3 => Step::IteratingTie(remoteness()?),
            4 => Step::MarkingDraw,
            5 => Step::Done,
            other => return Err(SolverError::Runtime(format!("unknown checkpoint step {other}"))),
        })
    }
}

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
    let mut run = ValueIteration::new(game, db, tier, options)?;
    let mut timer = CheckpointTimer::new(options.checkpoint);
    while run.step() != Step::Done {
        run.advance()?;
        if run.step() != Step::Done && timer.due() {
            let t = Instant::now();
            run.save_checkpoint()?;
            timer.saved(t.elapsed());
        }
    }
    run.finish(reference)?;
    info!("[{TAG}] tier {tier} solved in {:.2?}", started.elapsed());
    Ok(true)
}

/// Saves when the time since the last save exceeds twice what a save costs.
#[derive(Debug)]
struct CheckpointTimer {
    enabled: bool,
    last_save: Instant,
    cost: Duration,
}

impl CheckpointTimer {
    fn new(policy: CheckpointPolicy) -> Self {
        Self {
            enabled: policy.enabled,
            last_save: Instant::now(),
            cost: Duration::from_millis(policy.initial_cost_estimate_ms),
        }
    }

    fn due(&self) -> bool {
        self.enabled && self.last_save.elapsed() > self.cost * 2
    }

    fn saved(&mut self, cost: Duration) {
        self.cost = cost;
        self.last_save = Instant::now();
    }
}

/// A value-iteration run over one tier, driven one step at a time.
pub struct ValueIteration<'a, G: ?Sized> {
    game: Checked<'a, G>,
    db: &'a dyn Database,
    options: &'a SolveOptions,
    layout: TierLayout,
    records: RecordArray,
    /// Child tiers by the tier their records are stored under.
    loaded: FastMap<Tier, RecordArray>,
    largest_win_lose: Remoteness,
    largest_tie: Remoteness,
    step: Step,
}

impl<'a, G: TierGame + ?Sized> ValueIteration<'a, G> {
    /// Starts a run, resuming from the tier's checkpoint if one exists.
    pub fn new(game: &'a G, db: &'a dyn Database, tier: Tier, options: &'a SolveOptions) -> Result<Self> {
        let game = Checked::new(game, options.limits);
        let allocator = options.allocator();
        let layout = TierLayout::new(&game, tier)?;

        let (records, step) = if options.checkpoint.enabled && db.checkpoint_exists(tier) {
            let (records, status) = db.checkpoint_load(tier, layout.size, &allocator)?;
            let step = Step::from_status(status)?;
            info!("[{TAG}] tier {tier}: resuming from checkpoint at {step:?}");
            (records, step)
        } else {
            (RecordArray::new(tier, layout.size, &allocator)?, Step::NotStarted)
        };

        let mut loaded: FastMap<Tier, RecordArray> = FastMap::default();
        let mut largest_win_lose = 0;
        let mut largest_tie = 0;
        for &child in &layout.children {
            let stored = game.game.canonical_tier(child);
            if loaded.contains_key(&stored) {
                continue;
            }
            let array = db.load_tier(stored, game.game.tier_size(stored), &allocator)?;
            let (wl, tie) = largest_remoteness(&array, options.min_chunk());
            largest_win_lose = largest_win_lose.max(wl);
            largest_tie = largest_tie.max(tie);
            loaded.insert(stored, array);
        }
        debug!(
            "[{TAG}] tier {tier}: loaded {} child tiers, largest child remoteness {largest_win_lose} (win/lose) \
             {largest_tie} (tie)",
            loaded.len()
        );

        Ok(Self { game, db, options, layout, records, loaded, largest_win_lose, largest_tie, step })
    }

    #[inline]
    pub fn step(&self) -> Step {
        self.step
    }

    #[inline]
    pub fn records(&self) -> &RecordArray {
        &self.records
    }

    /// Performs the current step and moves to the next one.
    pub fn advance(&mut self) -> Result<Step> {
        self.step = match self.step {
            Step::NotStarted => Step::ScanningTier,
            Step::ScanningTier => {
                self.scan_tier()?;
                Step::IteratingWinLose(1)
            }
            Step::IteratingWinLose(i) => {
                let updated = self.iterate_win_lose(i)?;
                match next_round(i, updated, self.largest_win_lose)? {
                    Some(next) => Step::IteratingWinLose(next),
                    None => Step::IteratingTie(1),
                }
            }
            Step::IteratingTie(i) => {
                let updated = self.iterate_tie(i)?;
                match next_round(i, updated, self.largest_tie)? {
                    Some(next) => Step::IteratingTie(next),
                    None => Step::MarkingDraw,
                }
            }
            Step::MarkingDraw => {
                self.mark_draws();
                Step::Done
            }
            Step::Done => Step::Done,
        };
        Ok(self.step)
    }

    pub fn save_checkpoint(&self) -> Result<()> {
        self.db.checkpoint_save(&self.records, self.step.to_status())?;
        debug!("[{TAG}] tier {}: checkpoint saved at {:?}", self.layout.tier, self.step);
        Ok(())
    }

    /// Flushes a finished run and drops its checkpoint.
    pub fn finish(self, reference: Option<&dyn Database>) -> Result<()> {
        if self.step != Step::Done {
            return Err(SolverError::Runtime(format!(
                "tier {} finished at {:?}, before value iteration completed",
                self.layout.tier, self.step
            )));
        }
        save_and_compare(self.db, &self.records, self.options, reference, TAG)?;
        self.db.checkpoint_remove(self.layout.tier)
    }

    fn child_record(&self, child: TierPosition) -> Result<Record> {
        if child.tier == self.layout.tier {
            return Ok(self.records.get(child.position));
        }
        let stored = stored_position(self.game.game, child);
        self.loaded
            .get(&stored.tier)
            .filter(|array| stored.position < array.size())
            .map(|array| array.get(stored.position))
            .ok_or_else(|| {
                SolverError::adapter(child.tier, child.position, format!("child outside the tiers loaded for {}", self.layout.tier))
            })
    }

    /// Sets primitives, and parks positions without a record of their own as
    /// draws so that rounds skip them.
    fn scan_tier(&self) -> Result<()> {
        let tier = self.layout.tier;
        positions(self.layout.size, self.options.min_chunk()).try_for_each(|pos| -> Result<()> {
            let tp = TierPosition::new(tier, pos);
            if !self.game.is_solvable(tp) {
                self.records.set_value_remoteness(pos, Value::Draw, 0);
                return Ok(());
            }
            let value = self.game.game.primitive(tp);
            if value != Value::Undecided {
                self.records.set_value_remoteness(pos, value, 0);
                return Ok(());
            }
            let children = self.game.canonical_children(tp)?;
            if children.is_empty() {
                return Err(SolverError::adapter(tier, pos, "non-primitive position has no moves"));
            }
            for &child in &children {
                self.layout.check_child(tp, child)?;
            }
            Ok(())
        })
    }

    /// Decides wins and losses exactly `i` moves from the end.
    fn iterate_win_lose(&self, i: Remoteness) -> Result<bool> {
        let tier = self.layout.tier;
        let updated = ConcurrentBool::new(false);
        positions(self.layout.size, self.options.min_chunk()).try_for_each(|pos| -> Result<()> {
            if self.records.value(pos) != Value::Undecided {
                return Ok(());
            }
            let mut all_win = true;
            let mut largest = 0;
            for child in self.game.canonical_children(TierPosition::new(tier, pos))? {
                let (value, remoteness) = self.child_record(child)?.outcome();
                match value {
                    Value::Lose if remoteness + 1 == i => {
                        self.records.set_value_remoteness(pos, Value::Win, i);
                        updated.store(true);
                        return Ok(());
                    }
                    Value::Win => largest = largest.max(remoteness),
                    _ => all_win = false,
                }
            }
            if all_win && largest + 1 == i {
                self.records.set_value_remoteness(pos, Value::Lose, i);
                updated.store(true);
            }
            Ok(())
        })?;
        Ok(updated.load())
    }

    /// Decides ties exactly `i` moves from the end.
    fn iterate_tie(&self, i: Remoteness) -> Result<bool> {
        let tier = self.layout.tier;
        let updated = ConcurrentBool::new(false);
        positions(self.layout.size, self.options.min_chunk()).try_for_each(|pos| -> Result<()> {
            if self.records.value(pos) != Value::Undecided {
                return Ok(());
            }
            for child in self.game.canonical_children(TierPosition::new(tier, pos))? {
                let (value, remoteness) = self.child_record(child)?.outcome();
                if value == Value::Tie && remoteness + 1 == i {
                    self.records.set_value_remoteness(pos, Value::Tie, i);
                    updated.store(true);
                    break;
                }
            }
            Ok(())
        })?;
        Ok(updated.load())
    }

    fn mark_draws(&self) {
        let tier = self.layout.tier;
        positions(self.layout.size, self.options.min_chunk()).for_each(|pos| match self.records.value(pos) {
            Value::Undecided => self.records.set_value_remoteness(pos, Value::Draw, 0),
            Value::Draw if !self.game.is_solvable(TierPosition::new(tier, pos)) => {
                self.records.set(pos, Record::UNDECIDED);
            }
            _ => {}
        });
    }
}

/// Round after `i`, or `None` once neither this tier nor its children can
/// produce anything at `i + 1`. Child records reach up to `largest`.
fn next_round(i: Remoteness, updated: bool, largest: Remoteness) -> Result<Option<Remoteness>> {
    if !updated && i > largest {
        return Ok(None);
    }
    if i == REMOTENESS_MAX {
        if updated {
            return Err(SolverError::RemotenessOverflow(usize::from(i) + 1));
        }
        return Ok(None);
    }
    Ok(Some(i + 1))
}

/// Largest win/lose and tie remoteness stored in a loaded tier.
fn largest_remoteness(array: &RecordArray, min_chunk: usize) -> (Remoteness, Remoteness) {
    positions(array.size(), min_chunk)
        .map(|pos| {
            let (value, remoteness) = array.get(pos).outcome();
            match value {
                Value::Win | Value::Lose => (remoteness, 0),
                Value::Tie => (0, remoteness),
                _ => (0, 0),
            }
        })
        .reduce(|| (0, 0), |a, b| (a.0.max(b.0), a.1.max(b.1)))
}
