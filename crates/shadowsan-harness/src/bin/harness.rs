//! CLI entrypoint for the shadowsan harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shadowsan_core::{Granularity, RuntimeFlags, ShadowMagic, decode_granule};
use shadowsan_harness::fixtures::{FixtureOp, FixtureSet};
use shadowsan_harness::render::{explain, hex_bytes};
use shadowsan_harness::structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome};
use shadowsan_harness::verify::run_op;
use shadowsan_harness::{HarnessError, verify_case};
use shadowsan_runtime::{BugKind, FrameLayout, shadow_legend};

/// Shadow-memory inspection tooling for shadowsan.
#[derive(Debug, Parser)]
#[command(name = "shadowsan-harness")]
#[command(about = "Inspect shadow encodings and verify shadow fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poison one redzone and print the resulting shadow bytes.
    Encode {
        /// Addressable prefix in bytes.
        #[arg(long)]
        size: usize,
        /// Redzone length in bytes.
        #[arg(long)]
        redzone: usize,
        /// Magic name (`heap-left`, `global`, ...) or hex byte.
        #[arg(long, default_value = "heap-left")]
        magic: String,
        #[arg(long, default_value_t = 8)]
        granularity: usize,
    },
    /// Lay out an instrumented frame and print its shadow.
    Frame {
        /// Local variable sizes, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        vars: Vec<usize>,
        #[arg(long, default_value_t = 8)]
        granularity: usize,
    },
    /// Print the shadow of a heap chunk, live or freed.
    Heap {
        #[arg(long)]
        size: usize,
        #[arg(long, default_value_t = 128)]
        redzone: usize,
        #[arg(long)]
        freed: bool,
        #[arg(long, default_value_t = 8)]
        granularity: usize,
    },
    /// Print the shadow byte legend.
    Legend {
        #[arg(long, default_value_t = 8)]
        granularity: usize,
    },
    /// Decode one shadow byte and name the bug class it implies.
    Classify {
        /// Shadow byte (decimal or 0x..).
        #[arg(long)]
        byte: String,
        #[arg(long, default_value_t = 8)]
        granularity: usize,
    },
    /// Parse a SHADOWSAN_OPTIONS string and print the effective flags.
    Flags {
        #[arg(long, default_value = "")]
        options: String,
    },
    /// Verify fixture cases against the engine.
    Verify {
        /// Fixture JSON file (built-in cases when omitted).
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// JSONL log output path (stdout when omitted).
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long, default_value = "local")]
        run_id: String,
    },
    /// Write the built-in fixtures and an artifact index.
    EmitFixtures {
        #[arg(long)]
        output: PathBuf,
        /// Artifact index path (defaults to `<output>.index.json`).
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn parse_byte(raw: &str) -> Option<u8> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn print_shadow(op: &FixtureOp, granularity: usize) -> Result<(), HarnessError> {
    let g = Granularity::new(granularity)?;
    let bytes = run_op(op, g)?;
    println!("{}", hex_bytes(&bytes));
    print!("{}", explain(&bytes, g));
    Ok(())
}

fn verify(fixture: Option<PathBuf>, log: Option<PathBuf>, run_id: &str) -> Result<bool, HarnessError> {
    let set = match &fixture {
        Some(path) => FixtureSet::from_file(path)?,
        None => FixtureSet::builtin(),
    };
    let mut emitter = match &log {
        Some(path) => LogEmitter::to_file(path, run_id)?,
        None => LogEmitter::to_stdout(run_id),
    };
    emitter.emit(LogLevel::Info, "verify_start")?;

    let mut failures = 0_usize;
    for case in &set.cases {
        let entry = LogEntry::new("", LogLevel::Info, "fixture_case").with_case(&case.name, case.granularity);
        let entry = match verify_case(case) {
            Ok(result) => {
                let outcome = if result.passed {
                    Outcome::Pass
                } else {
                    failures += 1;
                    Outcome::Fail
                };
                entry
                    .with_outcome(outcome)
                    .with_shadow(result.expected, result.actual)
            }
            Err(err) => {
                failures += 1;
                entry
                    .with_outcome(Outcome::Error)
                    .with_details(serde_json::json!({ "error": err.to_string() }))
            }
        };
        emitter.emit_entry(entry)?;
    }

    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "verify_done").with_details(serde_json::json!({
            "cases": set.cases.len(),
            "failures": failures,
        })),
    )?;
    emitter.flush()?;
    Ok(failures == 0)
}

fn run(cli: Cli) -> Result<bool, HarnessError> {
    match cli.command {
        Command::Encode {
            size,
            redzone,
            magic,
            granularity,
        } => print_shadow(
            &FixtureOp::Redzone {
                size,
                redzone,
                magic,
            },
            granularity,
        )?,
        Command::Frame { vars, granularity } => {
            let g = Granularity::new(granularity)?;
            let unit = g.bytes().max(shadowsan_core::config::MIN_REDZONE);
            let layout = FrameLayout::new(&vars, unit)?;
            println!("frame size {} (redzone unit {unit})", layout.frame_size());
            for (idx, var) in layout.vars().iter().enumerate() {
                println!("  var{idx}: offset {} size {}", var.offset, var.size);
            }
            print_shadow(&FixtureOp::Frame { vars }, granularity)?;
        }
        Command::Heap {
            size,
            redzone,
            freed,
            granularity,
        } => {
            let op = if freed {
                FixtureOp::HeapFreed { size, redzone }
            } else {
                FixtureOp::HeapAllocated { size, redzone }
            };
            print_shadow(&op, granularity)?;
        }
        Command::Legend { granularity } => {
            print!("{}", shadow_legend(Granularity::new(granularity)?));
        }
        Command::Classify { byte, granularity } => {
            let g = Granularity::new(granularity)?;
            let value = parse_byte(&byte).ok_or_else(|| HarnessError::InvalidHex(byte.clone()))?;
            let state = decode_granule(value, g);
            let kind = ShadowMagic::from_byte(value)
                .filter(|_| matches!(state, shadowsan_core::GranuleState::Poisoned(_)))
                .map_or(BugKind::UnknownCrash, BugKind::from_magic);
            print!("{}", explain(&[value], g));
            println!("bug class: {kind}");
        }
        Command::Flags { options } => {
            let flags = RuntimeFlags::parse(&options)?;
            println!("{flags:#?}");
        }
        Command::Verify {
            fixture,
            log,
            run_id,
        } => return verify(fixture, log, &run_id),
        Command::EmitFixtures { output, index } => {
            let json = FixtureSet::builtin().to_json()?;
            std::fs::write(&output, &json)?;
            let mut artifacts = ArtifactIndex::new("emit-fixtures");
            artifacts.add(output.display().to_string(), "fixture", json.as_bytes());
            let index_path = index.unwrap_or_else(|| output.with_extension("index.json"));
            std::fs::write(&index_path, artifacts.to_json()?)?;
            println!("wrote {} and {}", output.display(), index_path.display());
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("shadowsan-harness: {err}");
            ExitCode::from(2)
        }
    }
}
