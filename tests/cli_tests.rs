use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Deserialize)]
struct QueryOut {
    tier: u64,
    position: u64,
    value: String,
    remoteness: u16,
}

fn tier_solve(db: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("tier-solve").expect("binary exists");
    cmd.args(args)
        .arg("--db")
        .arg(db)
        .args(["--tiers", "3", "--tier-size", "32", "--seed", "9", "--mirrored", "--aliases"])
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn solve_then_query_the_initial_position() {
    let dir = tempdir().expect("tempdir");
    tier_solve(dir.path(), &["solve"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[tier-solve]").and(predicate::str::contains("0 failed")));

    let out = tier_solve(dir.path(), &["query"]).output().expect("run query");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let parsed: QueryOut = serde_json::from_slice(&out.stdout).expect("query prints json");
    assert_eq!(parsed.tier, 2, "initial position lives in the last tier");
    assert_eq!(parsed.position % 2, 0);
    assert!(["win", "lose", "tie", "draw"].contains(&parsed.value.as_str()), "{}", parsed.value);
    if parsed.value == "draw" {
        assert_eq!(parsed.remoteness, 0);
    }
}

#[test]
fn solving_twice_skips_solved_tiers() {
    let dir = tempdir().expect("tempdir");
    tier_solve(dir.path(), &["solve"]).assert().success();
    tier_solve(dir.path(), &["solve"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[tier-solve] 0 solved"));
}

#[test]
fn query_before_solving_fails() {
    let dir = tempdir().expect("tempdir");
    tier_solve(dir.path(), &["query"]).assert().failure();
}

#[test]
fn self_test_passes_on_generated_games() {
    let dir = tempdir().expect("tempdir");
    tier_solve(dir.path(), &["test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("self-test passed"));
}

#[test]
fn compare_against_another_strategy() {
    let reference = tempdir().expect("tempdir");
    let dir = tempdir().expect("tempdir");
    tier_solve(reference.path(), &["solve", "--strategy", "frontier"]).assert().success();
    let reference_path = reference.path().to_str().expect("utf-8 path");
    tier_solve(dir.path(), &["solve", "--strategy", "value-iteration", "--compression", "zstd", "--compare", reference_path])
        .assert()
        .success();
}

#[test]
fn analyze_prints_one_line_per_tier() {
    let dir = tempdir().expect("tempdir");
    tier_solve(dir.path(), &["solve", "--strategy", "direct-update"]).assert().success();
    tier_solve(dir.path(), &["analyze"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reachable").and(predicate::str::contains("tier 2:")));
}
