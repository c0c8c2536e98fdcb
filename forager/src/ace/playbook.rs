//! File-backed playbook: one markdown file per target under `current/`, an
//! append-only JSONL audit log under `deltas/`, and timestamped archives
//! under `archive/`.
//!
//! Sections inside a file are joined by [`SECTION_SEPARATOR`] on disk; in
//! memory they are handled as an ordered `Vec<String>` and only joined on
//! write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::ace::delta::{AppliedDelta, ApplyStatus, ChangeType, PlaybookDelta};
use crate::core::types::{Channel, Event, PlaybookStats, Severity};

/// Literal separator between sections in a persisted playbook file.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const METADATA_VERSION: u32 = 1;

/// Size knobs for context assembly and Grow-and-Refine pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookConfig {
    /// How many current files `get_context` returns, newest first.
    pub context_limit: usize,
    /// Per-file character cap applied by `get_context`.
    pub context_chars: usize,
    /// Sections a file may keep after `refine`.
    pub max_sections: usize,
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self {
            context_limit: 3,
            context_chars: 400,
            max_sections: 6,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    version: u32,
    created_at: DateTime<Utc>,
}

/// Audit-log line: the full delta flattened next to the outcome fields.
#[derive(Debug, Serialize, Deserialize)]
struct DeltaLogEntry {
    timestamp: DateTime<Utc>,
    tick: u64,
    status: ApplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(flatten)]
    delta: PlaybookDelta,
}

/// Durable knowledge base with apply/retire semantics and periodic pruning.
///
/// Not safe for concurrent writers; one loop instance owns a root at a time.
#[derive(Debug)]
pub struct PlaybookStore {
    root: PathBuf,
    current_dir: PathBuf,
    delta_dir: PathBuf,
    archive_dir: PathBuf,
    config: PlaybookConfig,
}

impl PlaybookStore {
    /// Create or reopen a store root. Directory creation failures are fatal:
    /// the caller must not run against a half-initialized store.
    pub fn open(root: impl Into<PathBuf>, config: PlaybookConfig) -> Result<Self> {
        let root = root.into();
        let store = Self {
            current_dir: root.join("current"),
            delta_dir: root.join("deltas"),
            archive_dir: root.join("archive"),
            root,
            config,
        };
        for dir in [&store.current_dir, &store.delta_dir, &store.archive_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create playbook dir {}", dir.display()))?;
        }
        let metadata_path = store.root.join("metadata.json");
        if !metadata_path.exists() {
            let metadata = StoreMetadata {
                version: METADATA_VERSION,
                created_at: Utc::now(),
            };
            write_json(&metadata_path, &metadata)?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PlaybookConfig {
        self.config
    }

    /// Up to `context_limit` most-recently-modified current files, each
    /// truncated to `context_chars` characters. Newest first; ties broken by
    /// file name so the order is stable.
    pub fn get_context(&self) -> Result<Vec<String>> {
        let mut files = self.current_files()?;
        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let mut context = Vec::new();
        for (path, _) in files.into_iter().take(self.config.context_limit) {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read playbook file {}", path.display()))?;
            context.push(text.trim().chars().take(self.config.context_chars).collect());
        }
        Ok(context)
    }

    /// True iff the target file exists and its raw text contains the delta's
    /// trimmed content.
    pub fn contains(&self, delta: &PlaybookDelta) -> bool {
        match fs::read_to_string(self.target_path(&delta.target)) {
            Ok(text) => text.contains(delta.content.trim()),
            Err(_) => false,
        }
    }

    /// Apply a curated batch in input order. Every delta yields exactly one
    /// audit-log line and one observability event, applied or not.
    pub fn apply_deltas(
        &self,
        deltas: &[PlaybookDelta],
        tick: u64,
    ) -> Result<(Vec<AppliedDelta>, Vec<Event>)> {
        let mut applied = Vec::with_capacity(deltas.len());
        let mut events = Vec::with_capacity(deltas.len());
        for delta in deltas {
            let outcome = match delta.change_type {
                ChangeType::Add | ChangeType::Update => self.apply_add(delta)?,
                ChangeType::Retire => self.retire(delta)?,
                ChangeType::Unsupported => {
                    AppliedDelta::skipped(delta.clone(), "unsupported_change_type")
                }
            };
            self.log_delta(&outcome, tick)?;
            let severity = if outcome.status == ApplyStatus::Applied {
                Severity::Info
            } else {
                Severity::Warn
            };
            let status_name = match outcome.status {
                ApplyStatus::Applied => "applied",
                ApplyStatus::Skipped => "skipped",
                ApplyStatus::Deferred => "deferred",
            };
            events.push(
                Event::new(
                    Channel::Events,
                    severity,
                    format!("Playbook {status_name}: {}", delta.target),
                )
                .with_field("target", json!(delta.target))
                .with_field("status", json!(outcome.status))
                .with_field("reason", json!(outcome.reason))
                .with_field("tick", json!(tick)),
            );
            applied.push(outcome);
        }
        Ok((applied, events))
    }

    /// Grow-and-Refine compaction: keep the newest `max_sections` sections of
    /// every oversized file and archive the dropped leading sections.
    pub fn refine(&self, note: &str) -> Result<Event> {
        let mut files: Vec<PathBuf> = self
            .current_files()?
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        files.sort();

        let mut pruned_sections = 0usize;
        let mut touched: Vec<String> = Vec::new();
        for path in files {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read playbook file {}", path.display()))?;
            let sections = split_sections(&text);
            if sections.len() <= self.config.max_sections {
                continue;
            }
            let cut = sections.len() - self.config.max_sections;
            let (dropped, kept) = sections.split_at(cut);
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("target");
            let archive = self.archive_path(&format!("{stem}_refine"));
            fs::write(&archive, join_sections(dropped))
                .with_context(|| format!("write archive {}", archive.display()))?;
            fs::write(&path, join_sections(kept))
                .with_context(|| format!("write playbook file {}", path.display()))?;
            pruned_sections += dropped.len();
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                touched.push(name.to_string());
            }
            debug!(file = %path.display(), dropped = cut, "pruned playbook sections");
        }

        Ok(
            Event::new(Channel::Logs, Severity::Info, format!("Playbook refined: {note}"))
                .with_field("pruned_sections", json!(pruned_sections))
                .with_field("files", json!(touched)),
        )
    }

    /// Counters over `current/`: file count, non-empty sections, characters.
    pub fn stats(&self) -> Result<PlaybookStats> {
        let mut stats = PlaybookStats::default();
        for (path, _) in self.current_files()? {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read playbook file {}", path.display()))?;
            stats.files += 1;
            stats.sections += split_sections(&text).len();
            stats.characters += text.chars().count();
        }
        Ok(stats)
    }

    fn apply_add(&self, delta: &PlaybookDelta) -> Result<AppliedDelta> {
        let path = self.target_path(&delta.target);
        let content = delta.content.trim();
        if !path.exists() {
            fs::write(&path, format!("{content}\n"))
                .with_context(|| format!("write playbook file {}", path.display()))?;
            return Ok(AppliedDelta::applied(delta.clone()));
        }
        let existing = fs::read_to_string(&path)
            .with_context(|| format!("read playbook file {}", path.display()))?;
        if existing.contains(content) {
            return Ok(AppliedDelta::skipped(delta.clone(), "duplicate_content"));
        }
        let mut sections = split_sections(&existing);
        sections.push(content.to_string());
        fs::write(&path, join_sections(&sections))
            .with_context(|| format!("write playbook file {}", path.display()))?;
        Ok(AppliedDelta::applied(delta.clone()))
    }

    fn retire(&self, delta: &PlaybookDelta) -> Result<AppliedDelta> {
        let path = self.target_path(&delta.target);
        if !path.exists() {
            return Ok(AppliedDelta::skipped(delta.clone(), "target_not_found"));
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read playbook file {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("target");
        let archive = self.archive_path(stem);
        fs::write(&archive, text)
            .with_context(|| format!("write archive {}", archive.display()))?;
        fs::remove_file(&path)
            .with_context(|| format!("remove playbook file {}", path.display()))?;
        Ok(AppliedDelta::applied(delta.clone()))
    }

    fn log_delta(&self, outcome: &AppliedDelta, tick: u64) -> Result<()> {
        let entry = DeltaLogEntry {
            timestamp: Utc::now(),
            tick,
            status: outcome.status,
            reason: outcome.reason.clone(),
            delta: outcome.delta.clone(),
        };
        let path = self.delta_dir.join("history.jsonl");
        let mut line = serde_json::to_string(&entry).context("serialize delta log entry")?;
        line.push('\n');
        append_line(&path, &line)
    }

    fn target_path(&self, target: &str) -> PathBuf {
        self.current_dir.join(format!("{}.md", sanitize_target(target)))
    }

    /// Second-resolution timestamp plus a numeric suffix on collision, so an
    /// archive write never overwrites an earlier one.
    fn archive_path(&self, stem: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let base = format!("{stem}_{stamp}");
        let mut candidate = self.archive_dir.join(format!("{base}.md"));
        let mut suffix = 2;
        while candidate.exists() {
            candidate = self.archive_dir.join(format!("{base}-{suffix}.md"));
            suffix += 1;
        }
        candidate
    }

    fn current_files(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let entries = fs::read_dir(&self.current_dir)
            .with_context(|| format!("read playbook dir {}", self.current_dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("read playbook dir {}", self.current_dir.display()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .with_context(|| format!("stat playbook file {}", path.display()))?;
            files.push((path, modified));
        }
        Ok(files)
    }
}

/// Map a logical target to a safe file stem; anything outside
/// `[A-Za-z0-9._-]` collapses to `_` so a target can never escape `current/`.
fn sanitize_target(target: &str) -> String {
    static TARGET_RE: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
    TARGET_RE.replace_all(target, "_").into_owned()
}

fn split_sections(text: &str) -> Vec<String> {
    text.split(SECTION_SEPARATOR)
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_sections<S: AsRef<str>>(sections: &[S]) -> String {
    let mut joined = sections
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);
    joined.push('\n');
    joined
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open delta log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append delta log {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
