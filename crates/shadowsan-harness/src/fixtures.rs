//! Shadow fixture files.
//!
//! A fixture case names one poisoning operation and the exact shadow bytes it
//! must leave behind, starting at the granule of the operation's base address.

use serde::{Deserialize, Serialize};

/// Operation replayed by a fixture case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FixtureOp {
    /// Core redzone poisoner over a fresh buffer.
    Redzone {
        size: usize,
        redzone: usize,
        /// Magic name (`heap-left`, ...) or hex byte.
        magic: String,
    },
    /// Global registration; shadow covers the object and its redzone.
    Global { size: usize },
    /// Instrumented frame with the given local sizes.
    Frame { vars: Vec<usize> },
    /// Live heap chunk.
    HeapAllocated { size: usize, redzone: usize },
    /// Heap chunk after free.
    HeapFreed { size: usize, redzone: usize },
}

/// A single fixture test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureCase {
    pub name: String,
    /// Granule size in bytes.
    pub granularity: usize,
    pub op: FixtureOp,
    /// Space-separated hex bytes.
    pub expected_shadow: String,
}

impl FixtureCase {
    #[must_use]
    pub fn new(name: &str, granularity: usize, op: FixtureOp, expected_shadow: &str) -> Self {
        Self {
            name: name.to_string(),
            granularity,
            op,
            expected_shadow: expected_shadow.to_string(),
        }
    }
}

/// A collection of fixture cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSet {
    /// Schema version.
    pub version: String,
    pub cases: Vec<FixtureCase>,
}

impl FixtureSet {
    /// Load fixture set from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize fixture set to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load fixture set from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    /// Reference cases shipped with the harness.
    #[must_use]
    pub fn builtin() -> Self {
        let redzone = |size, redzone, magic: &str| FixtureOp::Redzone {
            size,
            redzone,
            magic: magic.to_string(),
        };
        Self {
            version: "1".to_string(),
            cases: vec![
                FixtureCase::new("partial_then_magic", 8, redzone(5, 16, "heap-left"), "05 fa"),
                FixtureCase::new("exact_fit", 8, redzone(8, 8, "heap-left"), "00"),
                FixtureCase::new("fully_poisoned", 8, redzone(0, 8, "stack-left"), "f1"),
                FixtureCase::new("two_granules_partial", 8, redzone(10, 16, "global"), "00 02"),
                FixtureCase::new("wide_sentinel", 128, redzone(130, 384, "global"), "00 02 ff"),
                FixtureCase::new(
                    "global_tail_and_redzone",
                    8,
                    FixtureOp::Global { size: 10 },
                    "00 02 f9 f9 f9 f9 f9 f9",
                ),
                FixtureCase::new(
                    "frame_two_locals",
                    8,
                    FixtureOp::Frame { vars: vec![4, 16] },
                    "f1 f1 f1 f1 04 f4 f4 f4 f2 f2 f2 f2 00 00 f4 f4 f3 f3 f3 f3",
                ),
                FixtureCase::new(
                    "heap_live",
                    8,
                    FixtureOp::HeapAllocated {
                        size: 13,
                        redzone: 32,
                    },
                    "fa fa fa fa 00 05 fb fb fb fb fb fb",
                ),
                FixtureCase::new(
                    "heap_freed",
                    8,
                    FixtureOp::HeapFreed {
                        size: 13,
                        redzone: 32,
                    },
                    "fa fa fa fa fd fd fd fd fb fb fb fb",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_tagged() {
        let set = FixtureSet::builtin();
        let json = set.to_json().unwrap();
        assert!(json.contains("\"op\": \"redzone\""));
        assert!(json.contains("\"op\": \"heap_freed\""));
        assert_eq!(FixtureSet::from_json(&json).unwrap(), set);
    }

    #[test]
    fn parses_handwritten_case() {
        let json = r#"{
            "version": "1",
            "cases": [
                {"name": "g", "granularity": 8, "op": {"op": "global", "size": 3},
                 "expected_shadow": "03 f9 f9 f9 f9 f9 f9 f9"}
            ]
        }"#;
        let set = FixtureSet::from_json(json).unwrap();
        assert_eq!(set.cases[0].op, FixtureOp::Global { size: 3 });
    }
}
