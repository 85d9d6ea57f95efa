use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tiersolve::solver::build_tier_graph;
use tiersolve::{
    analyze_all, solve_all, test_all, ArrayDb, Compression, Database, RandomGameParams, SolveOptions, Strategy,
    SyntheticGame, TierGame, TierPosition,
};

#[derive(Debug, Parser)]
#[command(name = "tier-solve", about = "Tiered retrograde solver over generated position graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database directory
    #[arg(long, global = true, default_value = "tiersolve-db")]
    db: PathBuf,

    /// Seed of the generated game
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,

    /// Number of tiers in the generated game
    #[arg(long, global = true, default_value_t = 4)]
    tiers: u64,

    /// Positions per tier in the generated game
    #[arg(long, global = true, default_value_t = 64)]
    tier_size: u64,

    /// Give every position a symmetric twin
    #[arg(long, global = true)]
    mirrored: bool,

    /// Route some cross-tier moves through symmetric copies of tiers
    #[arg(long, global = true)]
    aliases: bool,

    /// Hide the parents API so that solvers build reverse graphs
    #[arg(long, global = true)]
    no_parents: bool,

    /// Worker threads (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Memory pool per tier in MiB (default: unbounded)
    #[arg(long, global = true)]
    mem_mib: Option<usize>,

    /// JSON options file; flags given on the command line take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Recompute tiers that are already solved or analyzed
    #[arg(long, global = true)]
    force: bool,

    #[arg(long, global = true, value_enum)]
    strategy: Option<Strategy>,

    #[arg(long, global = true, value_enum)]
    compression: Option<Compression>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Solve every tier reachable from the initial position
    Solve {
        /// Reference database to check every solved tier against
        #[arg(long)]
        compare: Option<PathBuf>,
    },
    /// Discover reachable positions and store per-tier statistics
    Analyze,
    /// Run the adapter self-test on every tier
    Test,
    /// Print the stored outcome of one position (default: the initial position)
    Query {
        #[arg(long)]
        tier: Option<u64>,
        #[arg(long)]
        position: Option<u64>,
    },
}

fn options_from(cli: &Cli) -> Result<SolveOptions, Box<dyn std::error::Error>> {
    let mut options = match &cli.config {
        Some(path) => SolveOptions::from_json_file(path)?,
        None => SolveOptions::default(),
    };
    if cli.force {
        options.force = true;
    }
    if let Some(strategy) = cli.strategy {
        options.strategy = strategy;
    }
    if let Some(compression) = cli.compression {
        options.compression = compression;
    }
    if let Some(mib) = cli.mem_mib {
        options.memlimit_bytes = Some(mib.saturating_mul(1 << 20));
    }
    if cli.threads.is_some() {
        options.threads = cli.threads;
    }
    Ok(options)
}

fn progress(len: usize, label: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(&format!("[{{elapsed_precise}}] {label} {{bar:40.cyan/blue}} {{pos}}/{{len}} {{msg}}"))?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let options = options_from(&cli)?;
    if let Some(threads) = options.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }

    let params = RandomGameParams {
        seed: cli.seed,
        tiers: cli.tiers,
        tier_size: cli.tier_size,
        mirrored: cli.mirrored,
        aliases: cli.aliases,
        parents: !cli.no_parents,
        ..RandomGameParams::default()
    };
    let game = SyntheticGame::random(&params)?;
    let db = ArrayDb::from_options(&cli.db, &options)?;

    match &cli.command {
        Command::Solve { compare } => {
            let mut options = options.clone();
            let reference = match compare {
                Some(dir) => {
                    options.compare = true;
                    Some(ArrayDb::open(dir)?)
                }
                None => None,
            };
            let graph = build_tier_graph(&game, options.limits)?;
            let pb = progress(graph.len(), "tiers")?;
            let report = solve_all(&game, &db, &options, reference.as_ref().map(|r| r as &dyn Database), |t| {
                pb.inc(1);
                pb.set_message(format!("tier {t}"));
            })?;
            pb.finish_and_clear();
            println!(
                "[tier-solve] {} solved, {} already solved, {} failed, {} blocked",
                report.processed, report.skipped, report.failed, report.blocked
            );
            if !report.is_success() {
                return Err(format!("{} tiers did not solve", report.failed + report.blocked).into());
            }
        }
        Command::Analyze => {
            let graph = build_tier_graph(&game, options.limits)?;
            let pb = progress(graph.len(), "tiers")?;
            let report = analyze_all(&game, &db, &options, |t| {
                pb.inc(1);
                pb.set_message(format!("tier {t}"));
            })?;
            pb.finish_and_clear();
            for &tier in graph.tiers() {
                let a = db.load_analysis(tier)?;
                println!(
                    "[tier-solve] tier {tier}: reachable {} win {} lose {} tie {} draw {} avg moves {:.2}",
                    a.reachable,
                    a.count_of(tiersolve::Value::Win),
                    a.count_of(tiersolve::Value::Lose),
                    a.count_of(tiersolve::Value::Tie),
                    a.count_of(tiersolve::Value::Draw),
                    a.average_moves()
                );
            }
            if !report.is_success() {
                return Err(format!("{} tiers did not analyze", report.failed + report.blocked).into());
            }
        }
        Command::Test => {
            let failures = test_all(&game, options.limits, cli.seed)?;
            for (tier, failure) in &failures {
                println!("[tier-solve] tier {tier}: {failure} (code {})", failure.code());
            }
            if !failures.is_empty() {
                return Err(format!("{} tiers failed the self-test", failures.len()).into());
            }
            println!("[tier-solve] self-test passed");
        }
        Command::Query { tier, position } => {
            let tier = tier.unwrap_or_else(|| game.initial_tier());
            let position = position.unwrap_or_else(|| game.initial_position());
            let canonical_tier = game.canonical_tier(tier);
            let mapped = game.position_in_symmetric_tier(TierPosition::new(tier, position), canonical_tier);
            let stored = TierPosition::new(canonical_tier, game.canonical_position(TierPosition::new(canonical_tier, mapped)));
            let record = db.probe().record(stored)?;
            let out = serde_json::json!({
                "tier": tier,
                "position": position,
                "value": record.value().as_str(),
                "remoteness": record.remoteness(),
            });
            println!("{out}");
        }
    }
    Ok(())
}
