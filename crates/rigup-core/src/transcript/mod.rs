//! Append-only run transcript.
//!
//! One tab-separated line per record:
//!
//! ```text
//! 2026-03-01T10:00:00.000Z	-	run-start	mode=apply strategy=pip os=linux steps=4 plan=3f2a9c0d1b7e4a55
//! 2026-03-01T10:00:02.311Z	mask-sleep-targets	succeeded	ran `systemctl mask sleep.target`
//! 2026-03-01T10:00:02.312Z	-	run-end	completed succeeded=4 warned=0 failed=0 skipped=0
//! ```
//!
//! Every record is flushed and synced before `append` returns. The
//! transcript is an audit trail only; nothing reads it to decide what to run.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::TranscriptError;
use crate::executor::StepOutcome;
use crate::types::StepStatus;

/// Step column used by run-start and run-end records.
pub const BRACKET_STEP: &str = "-";

/// What a transcript line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "status")]
pub enum RecordKind {
    RunStart,
    Step(StepStatus),
    RunEnd,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::RunStart => "run-start",
            RecordKind::RunEnd => "run-end",
            RecordKind::Step(status) => status.as_str(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "run-start" => Some(RecordKind::RunStart),
            "run-end" => Some(RecordKind::RunEnd),
            other => other.parse().ok().map(RecordKind::Step),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptRecord {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub kind: RecordKind,
    pub message: String,
}

impl TranscriptRecord {
    pub fn run_start(message: impl Into<String>) -> Self {
        Self::bracket(RecordKind::RunStart, message)
    }

    pub fn run_end(message: impl Into<String>) -> Self {
        Self::bracket(RecordKind::RunEnd, message)
    }

    fn bracket(kind: RecordKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            step: BRACKET_STEP.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Render as a single line without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            sanitize(&self.step),
            self.kind,
            sanitize(&self.message)
        )
    }

    /// Parse a line written by [`TranscriptRecord::to_line`].
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '\t');
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
        let step = fields.next()?;
        let kind = RecordKind::parse(fields.next()?)?;
        let message = fields.next().unwrap_or_default();
        Some(Self {
            timestamp: timestamp.with_timezone(&Utc),
            step: step.to_string(),
            kind,
            message: message.to_string(),
        })
    }
}

impl From<&StepOutcome> for TranscriptRecord {
    fn from(outcome: &StepOutcome) -> Self {
        Self {
            timestamp: outcome.timestamp,
            step: outcome.step.clone(),
            kind: RecordKind::Step(outcome.status),
            message: outcome.message.clone(),
        }
    }
}

/// Keeps every record on one line and the columns intact.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c => c,
        })
        .collect()
}

/// Destination for transcript records.
pub trait TranscriptSink {
    /// Durably append one record.
    fn append(&mut self, record: &TranscriptRecord) -> Result<(), TranscriptError>;

    fn record(&mut self, outcome: &StepOutcome) -> Result<(), TranscriptError> {
        self.append(&TranscriptRecord::from(outcome))
    }
}

/// File-backed transcript opened in append mode.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    file: File,
}

impl Transcript {
    /// Open (creating if needed) the transcript at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TranscriptError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| TranscriptError::Open {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TranscriptError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed record in `path`. A missing file has no records.
    pub fn read_records(path: &Path) -> Result<Vec<TranscriptRecord>, TranscriptError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(TranscriptError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| {
                let record = TranscriptRecord::parse_line(line);
                if record.is_none() {
                    tracing::debug!(line = idx + 1, "Skipping malformed transcript line");
                }
                record
            })
            .collect())
    }
}

impl TranscriptSink for Transcript {
    fn append(&mut self, record: &TranscriptRecord) -> Result<(), TranscriptError> {
        let write_err = |source| TranscriptError::Write {
            path: self.path.clone(),
            source,
        };
        writeln!(self.file, "{}", record.to_line()).map_err(write_err)?;
        self.file.flush().map_err(write_err)?;
        self.file.sync_data().map_err(write_err)
    }
}

/// In-memory sink for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    records: Vec<TranscriptRecord>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    /// Records of executed or skipped steps, without the run brackets.
    pub fn step_records(&self) -> impl Iterator<Item = &TranscriptRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.kind, RecordKind::Step(_)))
    }
}

impl TranscriptSink for MemoryTranscript {
    fn append(&mut self, record: &TranscriptRecord) -> Result<(), TranscriptError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Group records into runs, each starting at a run-start record.
///
/// Records before the first run-start (a truncated head) form their own group.
pub fn group_runs(records: &[TranscriptRecord]) -> Vec<&[TranscriptRecord]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for (idx, record) in records.iter().enumerate() {
        if record.kind == RecordKind::RunStart && idx > start {
            runs.push(&records[start..idx]);
            start = idx;
        }
    }
    if start < records.len() {
        runs.push(&records[start..]);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(step: &str, status: StepStatus, message: &str) -> StepOutcome {
        StepOutcome {
            step: step.to_string(),
            status,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn line_round_trips() {
        let record = TranscriptRecord::from(&outcome("mask-sleep", StepStatus::Warned, "exit 1"));
        let parsed = TranscriptRecord::parse_line(&record.to_line()).unwrap();
        assert_eq!(parsed.step, "mask-sleep");
        assert_eq!(parsed.kind, RecordKind::Step(StepStatus::Warned));
        assert_eq!(parsed.message, "exit 1");
        assert_eq!(
            parsed.timestamp.timestamp_millis(),
            record.timestamp.timestamp_millis()
        );
    }

    #[test]
    fn multi_line_messages_stay_on_one_line() {
        let record = TranscriptRecord::from(&outcome(
            "pip",
            StepStatus::Warned,
            "error:\n\tno matching distribution",
        ));
        let line = record.to_line();
        assert!(!line.contains('\n'));
        assert_eq!(line.matches('\t').count(), 3);
    }

    #[test]
    fn file_transcript_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("transcript.log");

        {
            let mut transcript = Transcript::open(&path).unwrap();
            transcript.append(&TranscriptRecord::run_start("mode=apply")).unwrap();
            transcript
                .record(&outcome("a", StepStatus::Succeeded, "done"))
                .unwrap();
            transcript.append(&TranscriptRecord::run_end("completed")).unwrap();
        }
        {
            let mut transcript = Transcript::open(&path).unwrap();
            transcript.append(&TranscriptRecord::run_start("mode=revert")).unwrap();
            transcript.append(&TranscriptRecord::run_end("completed")).unwrap();
        }

        let records = Transcript::read_records(&path).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].kind, RecordKind::RunStart);
        assert_eq!(records[1].step, "a");
        assert_eq!(records[3].message, "mode=revert");

        let runs = group_runs(&records);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 3);
        assert_eq!(runs[1].len(), 2);
    }

    #[test]
    fn missing_transcript_reads_empty() {
        let temp = TempDir::new().unwrap();
        let records = Transcript::read_records(&temp.path().join("none.log")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("transcript.log");
        let good = TranscriptRecord::run_start("x").to_line();
        std::fs::write(&path, format!("garbage\n{good}\n\nnot\ta\trecord\n")).unwrap();

        let records = Transcript::read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let err = Transcript::open(blocker.join("transcript.log")).unwrap_err();
        assert!(matches!(err, TranscriptError::Open { .. }));
    }
}
