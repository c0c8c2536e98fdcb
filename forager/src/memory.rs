//! Bounded alert/exploration note logs with file persistence.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::{MemoryExport, Observation, Reflection};

const MAX_ENTRIES: usize = 200;

/// Two rolling note logs fed by reflections. `alert.log` collects fear
/// notes, `explore.log` curiosity notes; both survive restarts.
pub struct MemoryManager {
    root: PathBuf,
    max_entries: usize,
    alert_log: VecDeque<String>,
    explore_log: VecDeque<String>,
}

impl MemoryManager {
    /// Open (or create) the memory directory and reload persisted notes.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create memory dir {}", root.display()))?;
        let alert_log = load_log(&root.join("alert.log"), MAX_ENTRIES)?;
        let explore_log = load_log(&root.join("explore.log"), MAX_ENTRIES)?;
        debug!(
            alerts = alert_log.len(),
            explorations = explore_log.len(),
            "memory reloaded"
        );
        Ok(Self {
            root,
            max_entries: MAX_ENTRIES,
            alert_log,
            explore_log,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Latest note from each log plus the last two observation events.
    pub fn highlights(&self, observation: &Observation) -> Vec<String> {
        let mut highlights = Vec::new();
        if let Some(last) = self.alert_log.back() {
            highlights.push(format!("Alert note: {last}"));
        }
        if let Some(last) = self.explore_log.back() {
            highlights.push(format!("Exploration note: {last}"));
        }
        let events = &observation.data.events;
        for event in events.iter().skip(events.len().saturating_sub(2)) {
            highlights.push(format!("Recent event: {event}"));
        }
        highlights
    }

    /// Fold a reflection into the logs and rewrite both files.
    pub fn update(&mut self, reflection: &Reflection) -> Result<()> {
        for note in &reflection.fear_updates {
            push_bounded(&mut self.alert_log, note.clone(), self.max_entries);
        }
        for note in &reflection.curiosity_updates {
            push_bounded(&mut self.explore_log, note.clone(), self.max_entries);
        }
        self.persist("alert.log", &self.alert_log)?;
        self.persist("explore.log", &self.explore_log)?;
        Ok(())
    }

    /// Full log contents for the planner; the playbook channel is filled in
    /// by the loop.
    pub fn export(&self) -> MemoryExport {
        MemoryExport {
            alert: self.alert_log.iter().cloned().collect(),
            exploration: self.explore_log.iter().cloned().collect(),
            playbook: Vec::new(),
        }
    }

    fn persist(&self, name: &str, entries: &VecDeque<String>) -> Result<()> {
        let path = self.root.join(name);
        let text = entries.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        fs::write(&path, text).with_context(|| format!("write memory log {}", path.display()))
    }
}

fn load_log(path: &Path, max_entries: usize) -> Result<VecDeque<String>> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read memory log {}", path.display()))?;
    let mut log = VecDeque::new();
    for line in contents.lines().filter(|line| !line.trim().is_empty()) {
        push_bounded(&mut log, line.to_string(), max_entries);
    }
    Ok(log)
}

fn push_bounded(log: &mut VecDeque<String>, entry: String, max_entries: usize) {
    if log.len() == max_entries {
        log.pop_front();
    }
    log.push_back(entry);
}
