//! Snapshot persistence: per-episode JSONL artifacts under a run directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::core::types::LoopSnapshot;

/// Consumer of finished ticks. Sinks absorb their own failures; a broken
/// sink must not stop the loop.
pub trait SnapshotSink {
    fn publish(&mut self, snapshot: &LoopSnapshot);
}

/// Appends one JSON document per tick to an episode file, flushing each
/// line so external watchers can tail a live run.
pub struct JsonlSnapshotWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSnapshotWriter {
    /// Create `episode-<n>-<YYYYMMDD-HHMMSS>.jsonl` under `root`.
    pub fn create(root: &Path, episode: u32) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("create run dir {}", root.display()))?;
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = root.join(format!("episode-{episode}-{timestamp}.jsonl"));
        let file = File::create(&path)
            .with_context(|| format!("create snapshot file {}", path.display()))?;
        debug!(path = %path.display(), "episode snapshot file created");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSink for JsonlSnapshotWriter {
    fn publish(&mut self, snapshot: &LoopSnapshot) {
        let line = match serde_json::to_string(snapshot) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize snapshot");
                return;
            }
        };
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        if let Err(err) = result {
            warn!(error = %err, path = %self.path.display(), "failed to write snapshot");
        }
    }
}

/// Load snapshots back from a JSONL file, skipping lines that do not parse.
pub fn read_snapshots(path: &Path) -> Result<Vec<LoopSnapshot>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read snapshots {}", path.display()))?;
    let mut snapshots = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(err) => warn!(
                line = index + 1,
                path = %path.display(),
                error = %err,
                "skipping unparseable snapshot line"
            ),
        }
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_observation, make_snapshot};

    #[test]
    fn episode_file_name_carries_number_and_timestamp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let writer = JsonlSnapshotWriter::create(temp.path(), 3).expect("create");
        let name = writer
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("episode-3-"));
        assert!(name.ends_with(".jsonl"));
    }

    #[test]
    fn published_snapshots_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut writer = JsonlSnapshotWriter::create(temp.path(), 1).expect("create");
        let first = make_snapshot(make_observation(1, 1.0, 0.0, 0.0, 0.9));
        let second = make_snapshot(make_observation(2, 0.8, 0.1, 0.5, 0.8));
        writer.publish(&first);
        writer.publish(&second);
        let path = writer.path().to_path_buf();
        drop(writer);

        let loaded = read_snapshots(&path).expect("read");
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn unparseable_lines_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("episode-1-x.jsonl");
        let good = serde_json::to_string(&make_snapshot(make_observation(1, 1.0, 0.0, 0.0, 0.9)))
            .expect("serialize");
        fs::write(&path, format!("{good}\nnot json\n\n{good}\n")).expect("write");

        let loaded = read_snapshots(&path).expect("read");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(read_snapshots(&temp.path().join("absent.jsonl")).is_err());
    }
}
