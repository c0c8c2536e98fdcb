//! Simulation configuration (TOML).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::ace::PlaybookConfig;

/// Runtime configuration for the survival loop.
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForagerConfig {
    /// Maximum ticks per episode.
    pub tick_limit: u64,

    /// Base seed; episode `i` runs environment and planner with `seed + i`.
    pub seed: u64,

    /// Episodes to run back to back. Memory and playbook carry across.
    pub episodes: u32,

    /// Directory for the alert/exploration note logs.
    pub memory_root: PathBuf,

    pub planner: PlannerConfig,
    pub curation: CurationConfig,
}

/// Which planner drives the loop and how the delegate is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub mode: PlannerMode,
    pub binary: String,
    pub model: String,
    pub timeout_secs: u64,
    pub extra_args: Vec<String>,
    pub skip_permissions: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlannerMode {
    #[default]
    Heuristic,
    Delegate,
}

/// Playbook curation pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CurationConfig {
    pub enabled: bool,
    pub playbook_root: PathBuf,
    /// Run grow-and-refine every N ticks; 0 disables it.
    pub refine_interval: u64,
    pub max_deltas_per_tick: usize,
    pub context_limit: usize,
    pub context_chars: usize,
    pub max_sections: usize,
}

impl Default for ForagerConfig {
    fn default() -> Self {
        Self {
            tick_limit: 50,
            seed: 42,
            episodes: 1,
            memory_root: PathBuf::from("./data/memory"),
            planner: PlannerConfig::default(),
            curation: CurationConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlannerMode::Heuristic,
            binary: "claude".to_string(),
            model: "claude-4-5-sonnet-latest".to_string(),
            timeout_secs: 90,
            extra_args: Vec::new(),
            skip_permissions: true,
        }
    }
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            playbook_root: PathBuf::from("./data/playbook"),
            refine_interval: 0,
            max_deltas_per_tick: 3,
            context_limit: 3,
            context_chars: 400,
            max_sections: 6,
        }
    }
}

impl ForagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_limit == 0 {
            return Err(anyhow!("tick_limit must be > 0"));
        }
        if self.episodes == 0 {
            return Err(anyhow!("episodes must be > 0"));
        }
        if self.planner.timeout_secs == 0 {
            return Err(anyhow!("planner.timeout_secs must be > 0"));
        }
        if self.curation.max_deltas_per_tick == 0 {
            return Err(anyhow!("curation.max_deltas_per_tick must be > 0"));
        }
        if self.curation.context_limit == 0 {
            return Err(anyhow!("curation.context_limit must be > 0"));
        }
        if self.curation.context_chars < 80 {
            return Err(anyhow!("curation.context_chars must be >= 80"));
        }
        if self.curation.max_sections == 0 {
            return Err(anyhow!("curation.max_sections must be > 0"));
        }
        Ok(())
    }
}

impl From<&CurationConfig> for PlaybookConfig {
    fn from(config: &CurationConfig) -> Self {
        Self {
            context_limit: config.context_limit,
            context_chars: config.context_chars,
            max_sections: config.max_sections,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForagerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForagerConfig> {
    if !path.exists() {
        let cfg = ForagerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForagerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForagerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
