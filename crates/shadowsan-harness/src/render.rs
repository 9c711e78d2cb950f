//! Text rendering of shadow bytes.

use std::fmt::Write;

use shadowsan_core::{GranuleState, Granularity, decode_granule};
use shadowsan_runtime::ShadowMap;

use crate::error::HarnessError;

/// `05 fa` style lowercase hex.
#[must_use]
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (idx, b) in bytes.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Inverse of [`hex_bytes`]. Accepts any whitespace and an optional `0x`
/// prefix per byte.
pub fn parse_hex(raw: &str) -> Result<Vec<u8>, HarnessError> {
    raw.split_whitespace()
        .map(|tok| {
            let digits = tok.strip_prefix("0x").unwrap_or(tok);
            u8::from_str_radix(digits, 16).map_err(|_| HarnessError::InvalidHex(tok.to_string()))
        })
        .collect()
}

/// Shadow bytes covering `len` application bytes at `addr`.
#[must_use]
pub fn shadow_bytes(shadow: &ShadowMap, addr: usize, len: usize) -> Vec<u8> {
    let g = shadow.granularity();
    (0..g.granules(len))
        .map(|k| shadow.load(addr + k * g.bytes()))
        .collect()
}

fn describe_state(state: GranuleState) -> String {
    match state {
        GranuleState::Addressable => "addressable".to_string(),
        GranuleState::Partial(n) => format!("partial ({n} bytes)"),
        GranuleState::Poisoned(magic) => format!("{} ({})", magic.label(), magic.bug_kind()),
        GranuleState::WideSentinel => "unaddressable (wide)".to_string(),
        GranuleState::Unknown(b) => format!("unknown 0x{b:02x}"),
    }
}

/// One line per granule: offset, byte and meaning.
#[must_use]
pub fn explain(bytes: &[u8], granularity: Granularity) -> String {
    let mut out = String::new();
    for (k, &b) in bytes.iter().enumerate() {
        let _ = writeln!(
            out,
            "  +{:<6} {b:02x}  {}",
            k * granularity.bytes(),
            describe_state(decode_granule(b, granularity))
        );
    }
    out
}
