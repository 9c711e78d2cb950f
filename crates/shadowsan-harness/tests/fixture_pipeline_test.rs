//! Fixture file -> verification -> JSONL log pipeline.

use std::path::PathBuf;

use shadowsan_harness::structured_log::{
    LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file,
};
use shadowsan_harness::{FixtureCase, FixtureOp, FixtureSet, verify_set};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shadowsan-harness-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn fixture_file_round_trip_and_verify() {
    let mut set = FixtureSet::builtin();
    set.cases.push(FixtureCase::new(
        "wide_global",
        128,
        FixtureOp::Global { size: 130 },
        "00 02 ff",
    ));
    let path = scratch("fixtures.json");
    std::fs::write(&path, set.to_json().unwrap()).unwrap();

    let loaded = FixtureSet::from_file(&path).unwrap();
    assert_eq!(loaded, set);
    let results = verify_set(&loaded).unwrap();
    assert_eq!(results.len(), set.cases.len());
    for result in &results {
        assert!(result.passed, "{result:?}");
    }
}

#[test]
fn verification_log_validates() {
    let path = scratch("verify.jsonl");
    {
        let mut emitter = LogEmitter::to_file(&path, "it").unwrap();
        emitter.emit(LogLevel::Info, "verify_start").unwrap();
        for result in verify_set(&FixtureSet::builtin()).unwrap() {
            let outcome = if result.passed {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            emitter
                .emit_entry(
                    LogEntry::new("", LogLevel::Info, "fixture_case")
                        .with_case(result.case, 8)
                        .with_outcome(outcome)
                        .with_shadow(result.expected, result.actual),
                )
                .unwrap();
        }
        emitter.flush().unwrap();
    }

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 1 + FixtureSet::builtin().cases.len());
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn missing_fixture_file_is_io_error() {
    let err = FixtureSet::from_file(&scratch("does-not-exist.json")).unwrap_err();
    assert!(err.to_string().starts_with("io: "));
}
