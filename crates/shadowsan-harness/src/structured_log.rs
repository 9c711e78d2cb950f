//! Structured logging for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required and optional fields.
//! - [`ArtifactIndex`]: links a run's logs to the files it produced, with
//!   SHA-256 integrity.
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout or any writer.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Severity of a record. Run milestones and passing cases are `info`, shadow
/// mismatches `warn`, cases the harness could not run `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

const LEVEL_NAMES: [&str; 3] = ["info", "warn", "error"];

/// Verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

impl Outcome {
    #[must_use]
    pub const fn level(self) -> LogLevel {
        match self {
            Self::Pass => LogLevel::Info,
            Self::Fail => LogLevel::Warn,
            Self::Error => LogLevel::Error,
        }
    }
}

/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Fixture case name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_shadow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_shadow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            case: None,
            granularity: None,
            outcome: None,
            expected_shadow: None,
            actual_shadow: None,
            artifact_refs: None,
            details: None,
        }
    }

    /// Set the fixture case and its granule size.
    #[must_use]
    pub fn with_case(mut self, case: impl Into<String>, granularity: usize) -> Self {
        self.case = Some(case.into());
        self.granularity = Some(granularity);
        self
    }

    /// Record a verdict; the entry takes the verdict's level.
    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self.level = outcome.level();
        self
    }

    /// Set the expected and observed shadow bytes.
    #[must_use]
    pub fn with_shadow(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected_shadow = Some(expected.into());
        self.actual_shadow = Some(actual.into());
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Record an artifact whose content is `data`.
    pub fn add(&mut self, path: impl Into<String>, kind: impl Into<String>, data: &[u8]) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256_hex(data),
            size_bytes: Some(data.len() as u64),
        });
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = sha2::Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(Box::new(std::io::BufWriter::new(file)), run_id))
    }

    #[must_use]
    pub fn to_stdout(run_id: &str) -> Self {
        Self::to_writer(Box::new(std::io::stdout()), run_id)
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write>, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("shadowsan::{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a log entry with auto-generated trace_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let mut entry = LogEntry::new(trace_id, level, event);
        entry.run_id = Some(self.run_id.clone());
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry, filling `trace_id` and `run_id` when
    /// empty.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let err = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| vec![err("<json>", format!("invalid JSON: {e}"))])?;
    let Some(obj) = value.as_object() else {
        return Err(vec![err("<root>", "expected JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(err(field, "required field missing".to_string()));
        }
    }
    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !LEVEL_NAMES.contains(&level)
    {
        errors.push(err("level", format!("invalid level: '{level}'")));
    }
    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !["pass", "fail", "error"].contains(&outcome)
    {
        errors.push(err("outcome", format!("invalid outcome: '{outcome}'")));
    }
    // A verdict needs the case it belongs to.
    if obj.contains_key("outcome") && !obj.contains_key("case") {
        errors.push(err("case", "outcome records must name their case".to_string()));
    }
    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(err(
            "trace_id",
            format!("trace_id should follow shadowsan::<run_id>::<seq>, got: '{trace_id}'"),
        ));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value)
        .map_err(|e| vec![err("<deserialization>", format!("failed to deserialize: {e}"))])
}

/// Validate an entire JSONL file. Returns the non-empty line count and every
/// validation error found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

fn now_utc() -> String {
    // Seconds and millis since the epoch; no calendar crate in the stack.
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}Z", duration.as_secs(), duration.subsec_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_entry_serializes_required_fields_only() {
        let entry = LogEntry::new("shadowsan::r::001", LogLevel::Info, "start");
        let line = entry.to_jsonl().unwrap();
        assert!(line.contains("\"level\":\"info\""));
        assert!(!line.contains("outcome"));
        assert_eq!(validate_log_line(&line, 1).unwrap(), entry);
    }

    #[test]
    fn emitter_assigns_sequential_trace_ids() {
        let buf = SharedBuf::default();
        let mut emitter = LogEmitter::to_writer(Box::new(buf.clone()), "run7");
        emitter.emit(LogLevel::Info, "verify_start").unwrap();
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Info, "case")
                    .with_case("exact_fit", 8)
                    .with_outcome(Outcome::Pass)
                    .with_shadow("00", "00"),
            )
            .unwrap();
        emitter.flush().unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("shadowsan::run7::001"));
        assert!(lines[1].contains("shadowsan::run7::002"));
        let entry = validate_log_line(lines[1], 2).unwrap();
        assert_eq!(entry.case.as_deref(), Some("exact_fit"));
        assert_eq!(entry.run_id.as_deref(), Some("run7"));
    }

    #[test]
    fn validation_flags_schema_violations() {
        let errs = validate_log_line(r#"{"trace_id":"x","level":"loud"}"#, 3).unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"timestamp"));
        assert!(fields.contains(&"event"));
        assert!(fields.contains(&"level"));
        assert!(fields.contains(&"trace_id"));
        assert_eq!(errs[0].line_number, 3);

        let orphan = r#"{"timestamp":"0","trace_id":"a::b","level":"info","event":"e","outcome":"pass"}"#;
        let errs = validate_log_line(orphan, 1).unwrap_err();
        assert_eq!(errs[0].field, "case");

        assert_eq!(validate_log_line("[]", 1).unwrap_err()[0].field, "<root>");
    }

    #[test]
    fn verdicts_set_the_level() {
        let mismatch = LogEntry::new("a::b", LogLevel::Info, "fixture_case")
            .with_case("heap_live", 8)
            .with_outcome(Outcome::Fail);
        assert_eq!(mismatch.level, LogLevel::Warn);
        let line = mismatch.to_jsonl().unwrap();
        assert!(line.contains("\"level\":\"warn\""));
        assert_eq!(validate_log_line(&line, 1).unwrap(), mismatch);

        let broken = LogEntry::new("a::b", LogLevel::Info, "fixture_case")
            .with_case("bad", 8)
            .with_outcome(Outcome::Error);
        assert_eq!(broken.level, LogLevel::Error);
        assert_eq!(Outcome::Pass.level(), LogLevel::Info);

        let debug = r#"{"timestamp":"0","trace_id":"a::b","level":"debug","event":"e"}"#;
        assert_eq!(validate_log_line(debug, 1).unwrap_err()[0].field, "level");
    }

    #[test]
    fn artifact_index_hashes_content() {
        let mut index = ArtifactIndex::new("run");
        index.add("fixtures.json", "fixture", b"abc");
        assert_eq!(
            index.artifacts[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(index.artifacts[0].size_bytes, Some(3));
        assert!(index.to_json().unwrap().contains("\"index_version\": 1"));
    }
}
