mod common;

use common::{digests, options, solve_with, solved_tiers, temp_db, tp};
use tiersolve::solver::{Step, ValueIteration};
use tiersolve::{solve_tier, CheckpointPolicy, Database, RandomGameParams, SolveOptions, Strategy, SyntheticGame, Value};

fn checkpointing() -> SolveOptions {
    SolveOptions {
        checkpoint: CheckpointPolicy { enabled: true, ..CheckpointPolicy::default() },
        ..options(Strategy::ValueIteration)
    }
}

/// A chain long enough for several win/lose rounds: position `i` moves to
/// `i + 1`, and the last position is a primitive loss.
fn chain(len: u64) -> SyntheticGame {
    let mut builder = SyntheticGame::builder().tier(0, len).primitive(tp(0, len - 1), Value::Lose);
    for i in 0..len - 1 {
        builder = builder.edge(tp(0, i), tp(0, i + 1));
    }
    builder.build().expect("chain")
}

#[test]
fn steps_run_in_order() {
    let game = chain(4);
    let (_dir, db) = temp_db();
    let opts = checkpointing();
    let mut run = ValueIteration::new(&game, &db, 0, &opts).expect("new");
    let mut steps = vec![run.step()];
    while run.step() != Step::Done {
        steps.push(run.advance().expect("advance"));
    }
    assert_eq!(
        steps,
        vec![
            Step::NotStarted,
            Step::ScanningTier,
            Step::IteratingWinLose(1),
            Step::IteratingWinLose(2),
            Step::IteratingWinLose(3),
            Step::IteratingWinLose(4),
            Step::IteratingTie(1),
            Step::MarkingDraw,
            Step::Done,
        ]
    );
    let got: Vec<_> = (0..4).map(|p| run.records().get(p).outcome()).collect();
    let want: Vec<_> = (0..4).map(|p| expected_chain(4, p)).collect();
    assert_eq!(got, want);
    run.finish(None).expect("finish");
    assert!(!db.checkpoint_exists(0));
}

fn expected_chain(len: u64, p: u64) -> (Value, u16) {
    let r = (len - 1 - p) as u16;
    if r % 2 == 0 {
        (Value::Lose, r)
    } else {
        (Value::Win, r)
    }
}

#[test]
fn finishing_early_is_an_error() {
    let game = chain(3);
    let (_dir, db) = temp_db();
    let opts = checkpointing();
    let mut run = ValueIteration::new(&game, &db, 0, &opts).expect("new");
    run.advance().expect("advance");
    assert!(run.finish(None).is_err());
}

#[test]
fn resumed_run_matches_an_uninterrupted_one() {
    let game = chain(12);
    let (_full_dir, full) = temp_db();
    solve_tier(&game, &full, 0, &checkpointing(), None).expect("uninterrupted");

    let (_dir, db) = temp_db();
    let opts = checkpointing();
    {
        let mut run = ValueIteration::new(&game, &db, 0, &opts).expect("new");
        while run.step() != Step::IteratingWinLose(5) {
            run.advance().expect("advance");
        }
        run.save_checkpoint().expect("checkpoint");
    }
    assert!(db.checkpoint_exists(0));

    let resumed = ValueIteration::new(&game, &db, 0, &opts).expect("resume");
    assert_eq!(resumed.step(), Step::IteratingWinLose(5));
    drop(resumed);

    assert!(solve_tier(&game, &db, 0, &opts, None).expect("resumed solve"));
    assert!(!db.checkpoint_exists(0), "checkpoint is removed once the tier is flushed");
    assert_eq!(db.tier_digest(0).expect("digest"), full.tier_digest(0).expect("digest"));
}

#[test]
fn resume_across_tiers_of_a_random_game() {
    let params = RandomGameParams { seed: 5, tiers: 3, tier_size: 48, mirrored: true, aliases: true, ..RandomGameParams::default() };
    let game = SyntheticGame::random(&params).expect("random game");
    let (_full_dir, full) = solve_with(&game, Strategy::ValueIteration);

    let (_dir, db) = temp_db();
    let opts = checkpointing();
    let tiers = solved_tiers(&game);
    let (&top, lower) = tiers.split_last().expect("at least one tier");
    for &tier in lower {
        solve_tier(&game, &db, tier, &opts, None).expect("lower tier");
    }
    {
        let mut run = ValueIteration::new(&game, &db, top, &opts).expect("new");
        loop {
            let step = run.advance().expect("advance");
            let stop = match step {
                Step::IteratingWinLose(i) => i >= 2,
                Step::IteratingTie(_) | Step::MarkingDraw | Step::Done => true,
                Step::NotStarted | Step::ScanningTier => false,
            };
            if stop {
                break;
            }
        }
        run.save_checkpoint().expect("checkpoint");
    }
    solve_tier(&game, &db, top, &opts, None).expect("resumed solve");
    assert!(!db.checkpoint_exists(top));
    assert_eq!(digests(&game, &db), digests(&game, &full));
}

#[test]
fn disabled_checkpoints_start_over() {
    let game = chain(6);
    let (_dir, db) = temp_db();
    let opts = checkpointing();
    {
        let mut run = ValueIteration::new(&game, &db, 0, &opts).expect("new");
        run.advance().expect("advance");
        run.advance().expect("advance");
        run.save_checkpoint().expect("checkpoint");
    }
    let fresh = options(Strategy::ValueIteration);
    let run = ValueIteration::new(&game, &db, 0, &fresh).expect("new");
    assert_eq!(run.step(), Step::NotStarted);
}
