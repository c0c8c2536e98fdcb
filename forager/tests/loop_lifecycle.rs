//! End-to-end episode tests wiring the real grid world, heuristic planner,
//! memory and snapshot writer together the way the run command does.
//!
//! These drive `FeedbackLoop::run` over multiple episodes to verify
//! cross-episode continuity: the planner and memory persist, each episode
//! gets a fresh world, and the snapshot files round-trip losslessly.

use std::fs;

use forager::core::execution::ExecutionEngine;
use forager::core::result_format::ResultFormatter;
use forager::core::reward::RewardSynthesizer;
use forager::core::state_format::StateFormatter;
use forager::env::{Environment, GridWorld, GridWorldConfig};
use forager::looping::FeedbackLoop;
use forager::memory::MemoryManager;
use forager::planner::HeuristicPlanner;
use forager::report::{EpisodeSummary, RunReport, analyze_files, collect_snapshot_files};
use forager::snapshots::{JsonlSnapshotWriter, read_snapshots};

fn quiet_world(seed: u64) -> GridWorld {
    GridWorld::new(GridWorldConfig {
        seed,
        hazard_rate: 0.0,
        ..GridWorldConfig::default()
    })
}

/// Two episodes back to back sharing one planner and one memory root, each
/// episode on a fresh world with its own snapshot file.
///
/// Execution sequence:
/// 1. Episode 1: 6 loop ticks on a hazard-free map, snapshots written to jsonl
/// 2. Episode 2: same, with a reseeded world; its first plan quotes memory
///    notes accumulated during episode 1
/// 3. Aggregate the two summaries into a run report
#[test]
fn two_episode_run_shares_memory_and_writes_snapshot_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run_dir = temp.path().join("runs");
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");
    let mut planner = HeuristicPlanner::new(7);
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();

    let mut summaries = Vec::new();
    for episode in 1..=2u32 {
        let mut world = quiet_world(7 + u64::from(episode - 1));
        let engine = ExecutionEngine::new(world.action_schema().to_vec());
        let writer = JsonlSnapshotWriter::create(&run_dir, episode).expect("create writer");
        let snapshot_path = writer.path().to_path_buf();

        let snapshots = FeedbackLoop::new(
            &mut world,
            &mut planner,
            &engine,
            &state_formatter,
            &result_formatter,
            &reward,
            &mut memory,
        )
        .with_sink(Box::new(writer))
        .run(6)
        .expect("run episode");

        assert_eq!(snapshots.len(), 6);
        // the explore plan always carries move plus gather, and both step the
        // world, so environment ticks advance by two per loop tick
        let ticks: Vec<u64> = snapshots.iter().map(|snapshot| snapshot.tick).collect();
        assert_eq!(ticks, vec![2, 4, 6, 8, 10, 12]);

        if episode == 2 {
            let notes = snapshots[0].action_plan.notes.as_deref().expect("plan notes");
            assert!(
                notes.contains("Recent alert:"),
                "episode 2 should quote episode 1 memory, got: {notes}"
            );
            assert!(notes.contains("Exploration focus:"));
        }

        let loaded = read_snapshots(&snapshot_path).expect("read snapshot file");
        assert_eq!(loaded, snapshots);
        let raw = fs::read_to_string(&snapshot_path).expect("raw snapshot file");
        assert_eq!(raw.lines().filter(|line| !line.trim().is_empty()).count(), 6);

        let summary = EpisodeSummary::from_snapshots(episode, &snapshots);
        assert_eq!(summary.ticks, 6);
        assert_eq!(summary.final_life, 1.0);
        assert!(
            summary.final_unknown < 0.96,
            "some tiles should have been explored"
        );
        summaries.push(summary);
    }

    // one fear and one curiosity note per tick, persisted across episodes
    let export = memory.export();
    assert_eq!(export.alert.len(), 12);
    assert_eq!(export.exploration.len(), 12);
    let alert_log = fs::read_to_string(temp.path().join("memory/alert.log")).expect("alert log");
    assert_eq!(alert_log.lines().count(), 12);

    let report = RunReport::aggregate(&summaries);
    assert_eq!(report.episodes, 2);
    assert!((report.avg_ticks - 6.0).abs() < 1e-9);
}

/// A saturated hazard field with lethal damage ends the episode on its first
/// tick: the engine interrupts the plan, the loop stops early, and the
/// reflection records the loss in the alert memory.
#[test]
fn lethal_world_cuts_the_episode_short() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut world = GridWorld::new(GridWorldConfig {
        hazard_rate: 1.0,
        resource_rate: 0.0,
        hazard_damage: 1.5,
        ..GridWorldConfig::default()
    });
    let mut planner = HeuristicPlanner::new(7);
    let engine = ExecutionEngine::new(world.action_schema().to_vec());
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");

    let snapshots = FeedbackLoop::new(
        &mut world,
        &mut planner,
        &engine,
        &state_formatter,
        &result_formatter,
        &reward,
        &mut memory,
    )
    .run(10)
    .expect("run episode");

    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert!(snapshot.observation.done);
    assert!(snapshot.execution.interrupted);
    assert!(snapshot.observation.data.life <= 0.0);
    assert!(
        snapshot
            .execution
            .warnings
            .iter()
            .any(|warning| warning == "Environment reached terminal state.")
    );
    // fleeing through a saturated field is a high-risk move
    assert!(
        snapshot
            .execution
            .warnings
            .iter()
            .any(|warning| warning.starts_with("High risk action move_"))
    );

    let summary = EpisodeSummary::from_snapshots(1, &snapshots);
    assert_eq!(summary.ticks, 1);
    assert!(summary.final_life <= 0.0);

    let export = memory.export();
    assert_eq!(export.alert.len(), 1);
    assert!(export.alert[0].starts_with("Loss observed"));
}

/// A short two-episode run analyzed back from its snapshot directory.
/// Without curation the analysis reduces to episode counting plus reward
/// averaging: no playbook targets and no stats.
#[test]
fn analysis_of_a_run_dir_matches_the_episodes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run_dir = temp.path().join("runs");
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");
    let mut planner = HeuristicPlanner::new(11);
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();

    let mut episode_totals = Vec::new();
    for episode in 1..=2u32 {
        let mut world = quiet_world(11 + u64::from(episode - 1));
        let engine = ExecutionEngine::new(world.action_schema().to_vec());
        let writer = JsonlSnapshotWriter::create(&run_dir, episode).expect("create writer");
        let snapshots = FeedbackLoop::new(
            &mut world,
            &mut planner,
            &engine,
            &state_formatter,
            &result_formatter,
            &reward,
            &mut memory,
        )
        .with_sink(Box::new(writer))
        .run(3)
        .expect("run episode");
        episode_totals.push(
            snapshots
                .iter()
                .map(|snapshot| snapshot.reward.total())
                .sum::<f64>(),
        );
    }

    let files = collect_snapshot_files(&[run_dir]).expect("collect files");
    assert_eq!(files.len(), 2);

    let report = analyze_files(&files, 5).expect("analyze");
    assert_eq!(report.episodes, 2);
    assert!((report.average_ticks - 3.0).abs() < 1e-9);
    let expected = (episode_totals[0] + episode_totals[1]) / 2.0;
    assert!((report.average_total_reward - expected).abs() < 1e-9);
    assert!(report.playbook_top_targets.is_empty());
    assert!(report.playbook_stats_latest.is_none());
}
