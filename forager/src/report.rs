//! Per-episode summaries, cross-episode aggregation, and post-hoc analysis
//! of saved snapshot files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::ace::DeltaDisposition;
use crate::core::types::{LoopSnapshot, PlaybookStats};
use crate::snapshots::read_snapshots;

/// Outcome of one episode, reduced from its snapshot sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: u32,
    pub ticks: usize,
    pub total_reward: f64,
    pub final_life: f64,
    pub final_unknown: f64,
}

impl EpisodeSummary {
    pub fn from_snapshots(episode: u32, snapshots: &[LoopSnapshot]) -> Self {
        let Some(last) = snapshots.last() else {
            return Self {
                episode,
                ticks: 0,
                total_reward: 0.0,
                final_life: 0.0,
                final_unknown: 0.0,
            };
        };
        let total_reward = snapshots.iter().map(|s| s.reward.total()).sum();
        Self {
            episode,
            ticks: snapshots.len(),
            total_reward,
            final_life: last.observation.data.life,
            final_unknown: last.observation.data.unknown,
        }
    }
}

/// Aggregate over a whole run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub episodes: usize,
    pub avg_ticks: f64,
    pub avg_reward: f64,
    pub total_reward: f64,
}

impl RunReport {
    pub fn aggregate(summaries: &[EpisodeSummary]) -> Self {
        let episodes = summaries.len();
        if episodes == 0 {
            return Self::default();
        }
        let ticks: usize = summaries.iter().map(|s| s.ticks).sum();
        let total_reward: f64 = summaries.iter().map(|s| s.total_reward).sum();
        Self {
            episodes,
            avg_ticks: ticks as f64 / episodes as f64,
            avg_reward: total_reward / episodes as f64,
            total_reward,
        }
    }
}

/// Atomically write a report as pretty JSON (temp file + rename).
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(report).context("serialize report")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("report path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace report {}", path.display()))?;
    Ok(())
}

/// Cross-run statistics computed from saved snapshot files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub episodes: usize,
    pub average_ticks: f64,
    pub average_total_reward: f64,
    /// `(target, applied update count)` pairs, highest count first.
    pub playbook_top_targets: Vec<(String, usize)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_stats_latest: Option<PlaybookStats>,
}

/// Resolve analysis inputs: files are taken as-is, directories contribute
/// every `.jsonl` file below them in sorted order.
pub fn collect_snapshot_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            bail!("input path does not exist: {}", path.display());
        }
        if path.is_file() {
            files.push(path.clone());
        } else {
            let mut found = Vec::new();
            collect_jsonl(path, &mut found)
                .with_context(|| format!("scan directory {}", path.display()))?;
            found.sort();
            files.extend(found);
        }
    }
    Ok(files)
}

fn collect_jsonl(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_jsonl(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "jsonl") {
            found.push(path);
        }
    }
    Ok(())
}

/// Analyze snapshot files. Each file is one episode; files with no parseable
/// snapshot are ignored.
pub fn analyze_files(files: &[PathBuf], top_targets: usize) -> Result<AnalysisReport> {
    let mut episodes = 0usize;
    let mut ticks = 0usize;
    let mut total_reward = 0.0f64;
    let mut target_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut stats_latest = None;

    for file in files {
        let snapshots = read_snapshots(file)?;
        if snapshots.is_empty() {
            continue;
        }
        episodes += 1;
        ticks += snapshots.len();
        for snapshot in &snapshots {
            total_reward += snapshot.reward.total();
            for update in &snapshot.playbook_updates {
                if update.status == DeltaDisposition::Applied {
                    *target_counts.entry(update.target.clone()).or_default() += 1;
                }
            }
            if let Some(stats) = snapshot.playbook_stats {
                stats_latest = Some(stats);
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = target_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_targets);

    if episodes == 0 {
        return Ok(AnalysisReport::default());
    }
    Ok(AnalysisReport {
        episodes,
        average_ticks: ticks as f64 / episodes as f64,
        average_total_reward: total_reward / episodes as f64,
        playbook_top_targets: ranked,
        playbook_stats_latest: stats_latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ace::{ChangeType, DeltaRecord};
    use crate::core::types::RewardBreakdown;
    use crate::test_support::{make_observation, make_snapshot};

    fn snapshot_with_reward(tick: u64, external: f64, internal: f64) -> LoopSnapshot {
        let mut snapshot = make_snapshot(make_observation(tick, 0.9, 0.1, 0.2, 0.5));
        snapshot.reward = RewardBreakdown {
            external_reward: external,
            internal_reward: internal,
            components: BTreeMap::new(),
        };
        snapshot
    }

    fn record(target: &str, status: DeltaDisposition) -> DeltaRecord {
        DeltaRecord {
            target: target.to_string(),
            change_type: ChangeType::Add,
            status,
            reason: None,
            content: "## note".to_string(),
            priority: 0.5,
            tags: Vec::new(),
        }
    }

    fn write_jsonl(path: &Path, snapshots: &[LoopSnapshot]) {
        let lines: Vec<String> = snapshots
            .iter()
            .map(|s| serde_json::to_string(s).expect("serialize"))
            .collect();
        fs::write(path, format!("{}\n", lines.join("\n"))).expect("write");
    }

    #[test]
    fn empty_episode_summary_is_zeroed() {
        let summary = EpisodeSummary::from_snapshots(2, &[]);
        assert_eq!(summary.episode, 2);
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.total_reward, 0.0);
    }

    #[test]
    fn summary_totals_reward_and_keeps_final_signals() {
        let snapshots = vec![
            snapshot_with_reward(1, 0.1, 0.02),
            snapshot_with_reward(2, -0.15, 0.0),
        ];
        let summary = EpisodeSummary::from_snapshots(1, &snapshots);
        assert_eq!(summary.ticks, 2);
        assert!((summary.total_reward - (-0.03)).abs() < 1e-9);
        assert_eq!(summary.final_life, 0.9);
        assert_eq!(summary.final_unknown, 0.5);
    }

    #[test]
    fn aggregate_averages_across_episodes() {
        let summaries = vec![
            EpisodeSummary {
                episode: 1,
                ticks: 10,
                total_reward: 1.0,
                final_life: 0.5,
                final_unknown: 0.2,
            },
            EpisodeSummary {
                episode: 2,
                ticks: 20,
                total_reward: 3.0,
                final_life: 0.8,
                final_unknown: 0.1,
            },
        ];
        let report = RunReport::aggregate(&summaries);
        assert_eq!(report.episodes, 2);
        assert_eq!(report.avg_ticks, 15.0);
        assert_eq!(report.avg_reward, 2.0);
        assert_eq!(report.total_reward, 4.0);
    }

    #[test]
    fn aggregate_of_nothing_is_zeroed() {
        assert_eq!(RunReport::aggregate(&[]), RunReport::default());
    }

    #[test]
    fn report_file_is_pretty_json_with_trailing_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("reports/run.json");
        let report = RunReport {
            episodes: 1,
            avg_ticks: 4.0,
            avg_reward: 0.5,
            total_reward: 0.5,
        };
        write_report(&path, &report).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with('\n'));
        assert!(contents.contains("\n  \"episodes\": 1"));
        let parsed: RunReport = serde_json::from_str(&contents).expect("parse");
        assert_eq!(parsed, report);
    }

    #[test]
    fn collect_walks_directories_recursively_and_sorts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(temp.path().join("b.jsonl"), "").expect("write");
        fs::write(nested.join("a.jsonl"), "").expect("write");
        fs::write(temp.path().join("notes.txt"), "skip me").expect("write");

        let files = collect_snapshot_files(&[temp.path().to_path_buf()]).expect("collect");
        assert_eq!(
            files,
            vec![temp.path().join("b.jsonl"), nested.join("a.jsonl")]
        );
    }

    #[test]
    fn collect_rejects_missing_input() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = collect_snapshot_files(&[temp.path().join("absent")]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn analyze_counts_applied_targets_and_latest_stats() {
        let temp = tempfile::tempdir().expect("tempdir");

        let mut first = snapshot_with_reward(1, 0.2, 0.0);
        first.playbook_updates = vec![
            record("survival_playbook", DeltaDisposition::Applied),
            record("survival_playbook", DeltaDisposition::Rejected),
        ];
        first.playbook_stats = Some(PlaybookStats {
            files: 1,
            sections: 1,
            characters: 40,
        });
        let mut second = snapshot_with_reward(2, 0.1, 0.05);
        second.playbook_updates = vec![
            record("survival_playbook", DeltaDisposition::Applied),
            record("exploration_notes", DeltaDisposition::Applied),
        ];
        second.playbook_stats = Some(PlaybookStats {
            files: 2,
            sections: 3,
            characters: 120,
        });

        write_jsonl(&temp.path().join("episode-1.jsonl"), &[first, second]);
        write_jsonl(
            &temp.path().join("episode-2.jsonl"),
            &[snapshot_with_reward(1, 0.05, 0.0)],
        );
        fs::write(temp.path().join("episode-3.jsonl"), "").expect("write");

        let files = collect_snapshot_files(&[temp.path().to_path_buf()]).expect("collect");
        let report = analyze_files(&files, 5).expect("analyze");

        assert_eq!(report.episodes, 2);
        assert_eq!(report.average_ticks, 1.5);
        assert!((report.average_total_reward - 0.2).abs() < 1e-9);
        assert_eq!(
            report.playbook_top_targets,
            vec![
                ("survival_playbook".to_string(), 2),
                ("exploration_notes".to_string(), 1),
            ]
        );
        assert_eq!(
            report.playbook_stats_latest,
            Some(PlaybookStats {
                files: 2,
                sections: 3,
                characters: 120,
            })
        );
    }

    #[test]
    fn analyze_with_no_snapshots_is_default() {
        let report = analyze_files(&[], 5).expect("analyze");
        assert_eq!(report, AnalysisReport::default());
    }
}
