//! Snapshot ingestion: a startup scan of the run directory plus incremental
//! tailing of appends.
//!
//! Episode files are append-only JSONL, so ingestion keeps one byte offset
//! per file and only parses lines added since the last read. A poll watcher
//! turns filesystem appends into ingest calls; a partially written trailing
//! line is left in place and retried on the next read.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use forager::core::types::LoopSnapshot;
use forager::report::collect_snapshot_files;

use crate::state::AppState;

/// How often the poll watcher checks the run directory for changes.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Spawn the ingest task: scan existing files, then tail appends.
pub fn start(state: AppState) {
    tokio::spawn(async move {
        if let Err(error) = run(state).await {
            error!(error = %error, "Snapshot ingest task failed");
        }
    });
}

async fn run(state: AppState) -> Result<()> {
    let run_dir = state.run_dir.clone();
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run directory {}", run_dir.display()))?;

    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);
    let tx_clone = tx.clone();

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx_clone.try_send(event);
            }
        },
        Config::default().with_poll_interval(POLL_INTERVAL),
    )?;
    // Watch before scanning so appends during the scan still produce events;
    // the offsets make an overlapping read a no-op.
    watcher.watch(&run_dir, RecursiveMode::Recursive)?;

    let mut offsets: HashMap<PathBuf, u64> = HashMap::new();
    let loaded = scan_existing(&state, &mut offsets).await?;
    info!(
        path = %run_dir.display(),
        files = offsets.len(),
        snapshots = loaded,
        "Watching run directory"
    );

    while let Some(event) = rx.recv().await {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }
        for path in &event.paths {
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                ingest_file(&state, &mut offsets, path).await;
            }
        }
    }
    Ok(())
}

/// Read every episode file already present, in sorted filename order.
async fn scan_existing(state: &AppState, offsets: &mut HashMap<PathBuf, u64>) -> Result<usize> {
    let files = collect_snapshot_files(std::slice::from_ref(&state.run_dir))?;
    let mut total = 0;
    for path in files {
        let (snapshots, offset) = read_appended(&path, 0)?;
        total += snapshots.len();
        for snapshot in snapshots {
            state.ingest(snapshot).await;
        }
        offsets.insert(path, offset);
    }
    Ok(total)
}

async fn ingest_file(state: &AppState, offsets: &mut HashMap<PathBuf, u64>, path: &Path) {
    let offset = offsets.get(path).copied().unwrap_or(0);
    match read_appended(path, offset) {
        Ok((snapshots, new_offset)) => {
            offsets.insert(path.to_path_buf(), new_offset);
            if !snapshots.is_empty() {
                debug!(
                    path = %path.display(),
                    count = snapshots.len(),
                    "Ingested appended snapshots"
                );
            }
            for snapshot in snapshots {
                state.ingest(snapshot).await;
            }
        }
        Err(error) => {
            warn!(path = %path.display(), error = %error, "Failed to read snapshot file");
        }
    }
}

/// Parse the complete lines appended to `path` since `offset`.
///
/// Returns the parsed snapshots and the new offset. The offset stops at the
/// last newline, so an unterminated trailing line is picked up once the
/// writer finishes it. A file shorter than the stored offset was rewritten
/// and is re-read from the start.
fn read_appended(path: &Path, offset: u64) -> Result<(Vec<LoopSnapshot>, u64)> {
    let mut file =
        File::open(path).with_context(|| format!("open snapshot file {}", path.display()))?;
    let len = file.metadata()?.len();
    let start = if len < offset { 0 } else { offset };
    if len == start {
        return Ok((Vec::new(), start));
    }

    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut bytes)?;

    let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
        return Ok((Vec::new(), start));
    };
    let complete = &bytes[..=last_newline];
    let new_offset = start + complete.len() as u64;

    let mut snapshots = Vec::new();
    for line in complete.split(|b| *b == b'\n') {
        let Ok(text) = std::str::from_utf8(line) else {
            warn!(path = %path.display(), "Skipping non-utf8 snapshot line");
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<LoopSnapshot>(text) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Skipping malformed snapshot line");
            }
        }
    }
    Ok((snapshots, new_offset))
}
