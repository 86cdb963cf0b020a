//! Transcript inspection.

use std::path::Path;

use anyhow::Context;

use crate::transcript::{Transcript, TranscriptRecord, group_runs};

/// The last `runs` runs recorded in the transcript at `path`, oldest first.
pub fn recent_runs(path: &Path, runs: usize) -> anyhow::Result<Vec<Vec<TranscriptRecord>>> {
    let records = Transcript::read_records(path)
        .with_context(|| format!("Failed to load transcript: {}", path.display()))?;
    let grouped = group_runs(&records);
    let skip = grouped.len().saturating_sub(runs);
    Ok(grouped
        .into_iter()
        .skip(skip)
        .map(|run| run.to_vec())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSink;

    #[test]
    fn keeps_only_the_latest_runs() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("transcript.log");
        let mut transcript = Transcript::open(&path).unwrap();
        for n in 0..3 {
            transcript
                .append(&TranscriptRecord::run_start(format!("run {n}")))
                .unwrap();
            transcript
                .append(&TranscriptRecord::run_end("completed"))
                .unwrap();
        }

        let runs = recent_runs(&path, 2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0][0].message, "run 1");
        assert_eq!(runs[1][0].message, "run 2");

        assert_eq!(recent_runs(&path, 10).unwrap().len(), 3);
        assert!(recent_runs(&temp.path().join("none"), 5).unwrap().is_empty());
    }
}
