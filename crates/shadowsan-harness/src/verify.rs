//! Replay fixture cases against the engine.

use serde::{Deserialize, Serialize};
use shadowsan_core::{Granularity, ShadowMagic, poison_partial_right_redzone, shadow_len};
use shadowsan_runtime::{FrameLayout, GlobalDescriptor, GlobalRegistry, HeapChunk, ShadowMap};

use crate::error::HarnessError;
use crate::fixtures::{FixtureCase, FixtureOp, FixtureSet};
use crate::render::{hex_bytes, parse_hex, shadow_bytes};

/// Base address every region-level case is placed at.
pub const FIXTURE_BASE: usize = 0x10_0000;

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub case: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

/// Redzone unit for globals and frames at granularity `g`.
fn frame_unit(g: Granularity) -> usize {
    g.bytes().max(shadowsan_core::config::MIN_REDZONE)
}

fn magic_named(name: &str) -> Result<ShadowMagic, HarnessError> {
    ShadowMagic::from_name(name).ok_or_else(|| HarnessError::UnknownMagic(name.to_string()))
}

/// Shadow bytes an operation produces.
pub fn run_op(op: &FixtureOp, granularity: Granularity) -> Result<Vec<u8>, HarnessError> {
    match op {
        FixtureOp::Redzone {
            size,
            redzone,
            magic,
        } => {
            let mut shadow = vec![0_u8; shadow_len(*redzone, granularity)];
            poison_partial_right_redzone(
                &mut shadow,
                *size,
                *redzone,
                granularity,
                magic_named(magic)?,
            );
            Ok(shadow)
        }
        FixtureOp::Global { size } => {
            let unit = frame_unit(granularity);
            let shadow = ShadowMap::new(granularity);
            GlobalRegistry::new().register(
                GlobalDescriptor::new(FIXTURE_BASE, *size, "fixture"),
                &shadow,
                unit,
            )?;
            let covered = size.div_ceil(unit) * unit + unit;
            Ok(shadow_bytes(&shadow, FIXTURE_BASE, covered))
        }
        FixtureOp::Frame { vars } => {
            let layout = FrameLayout::new(vars, frame_unit(granularity))?;
            let shadow = ShadowMap::new(granularity);
            layout.poison(&shadow, FIXTURE_BASE)?;
            Ok(shadow_bytes(&shadow, FIXTURE_BASE, layout.frame_size()))
        }
        FixtureOp::HeapAllocated { size, redzone } | FixtureOp::HeapFreed { size, redzone } => {
            let chunk = HeapChunk::new(FIXTURE_BASE, *size, *redzone);
            chunk.validate(granularity)?;
            let shadow = ShadowMap::new(granularity);
            chunk.poison_allocated(&shadow)?;
            if matches!(op, FixtureOp::HeapFreed { .. }) {
                chunk.poison_freed(&shadow)?;
            }
            Ok(shadow_bytes(&shadow, FIXTURE_BASE, chunk.chunk_size()))
        }
    }
}

pub fn verify_case(case: &FixtureCase) -> Result<VerificationResult, HarnessError> {
    let granularity = Granularity::new(case.granularity)?;
    let expected = parse_hex(&case.expected_shadow)?;
    let actual = run_op(&case.op, granularity)?;
    Ok(VerificationResult {
        case: case.name.clone(),
        passed: actual == expected,
        expected: hex_bytes(&expected),
        actual: hex_bytes(&actual),
    })
}

pub fn verify_set(set: &FixtureSet) -> Result<Vec<VerificationResult>, HarnessError> {
    set.cases.iter().map(verify_case).collect()
}
