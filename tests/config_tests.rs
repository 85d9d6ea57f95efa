use std::fs;

use tempfile::tempdir;
use tiersolve::{Compression, ErrorCode, Limits, SolveOptions, SolverError, Strategy};

#[test]
fn json_fields_are_optional() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("solve.json");
    fs::write(
        &path,
        r#"{
            "strategy": "direct-update",
            "memlimit_bytes": 1048576,
            "compression": "zstd",
            "checkpoint": { "enabled": false },
            "limits": { "child_tiers": 8 }
        }"#,
    )
    .expect("write");

    let opts = SolveOptions::from_json_file(&path).expect("parse");
    let defaults = SolveOptions::default();
    assert_eq!(opts.strategy, Strategy::DirectUpdate);
    assert_eq!(opts.memlimit_bytes, Some(1 << 20));
    assert_eq!(opts.compression, Compression::Zstd);
    assert!(!opts.checkpoint.enabled);
    assert_eq!(opts.checkpoint.initial_cost_estimate_ms, defaults.checkpoint.initial_cost_estimate_ms);
    assert_eq!(opts.limits, Limits { child_tiers: 8, ..Limits::default() });
    assert_eq!(opts.scan_chunk, defaults.scan_chunk);
    assert_eq!(opts.block_records, defaults.block_records);
    assert!(!opts.force && !opts.compare);
    assert_eq!(opts.allocator().limit(), 1 << 20);
}

#[test]
fn empty_object_gives_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("empty.json");
    fs::write(&path, "{}").expect("write");
    let opts = SolveOptions::from_json_file(&path).expect("parse");
    assert_eq!(opts, SolveOptions::default());
    assert_eq!(opts.allocator().limit(), usize::MAX);
}

#[test]
fn every_strategy_name_parses() {
    for (name, strategy) in [
        ("auto", Strategy::Auto),
        ("frontier", Strategy::Frontier),
        ("direct-update", Strategy::DirectUpdate),
        ("value-iteration", Strategy::ValueIteration),
    ] {
        let parsed: Strategy = serde_json::from_str(&format!("\"{name}\"")).expect("strategy");
        assert_eq!(parsed, strategy);
    }
}

#[test]
fn bad_files_are_reported() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{ "strategy": "fastest" }"#).expect("write");
    let result = SolveOptions::from_json_file(&path);
    assert!(matches!(result, Err(SolverError::Corrupt { .. })), "{result:?}");
    assert_eq!(ErrorCode::of(&result), ErrorCode::FileSystem);

    let missing = SolveOptions::from_json_file(dir.path().join("nope.json"));
    assert!(matches!(missing, Err(SolverError::FileSystem { .. })), "{missing:?}");
}
