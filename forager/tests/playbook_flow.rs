//! End-to-end curation tests: a scripted world and planner drive the real
//! loop against a real playbook store on disk.
//!
//! Scripting the collaborators pins down which deltas each tick proposes, so
//! the tests can assert exact store layout, audit-log contents and the
//! context fed back into later plans.

use std::fs;

use serde_json::json;

use forager::ace::{Curator, DeltaDisposition, PlaybookConfig, PlaybookStore, Reflector};
use forager::core::execution::ExecutionEngine;
use forager::core::result_format::ResultFormatter;
use forager::core::reward::RewardSynthesizer;
use forager::core::state_format::StateFormatter;
use forager::core::types::{Observation, Severity};
use forager::env::Environment;
use forager::looping::{CurationPipeline, FeedbackLoop};
use forager::memory::MemoryManager;
use forager::test_support::{
    ScriptedDelegate, ScriptedEnvironment, ScriptedPlanner, make_delta, make_observation,
    make_plan,
};

/// A rewarded step with shrinking unknown, so the heuristic reflector always
/// proposes a survival tactic for the tick.
fn rewarding_step(tick: u64, unknown: f64) -> Observation {
    let mut observation = make_observation(tick, 0.9, 0.3, 0.1, unknown);
    observation.reward = 0.2;
    observation
}

fn scripted_env(ticks: u64) -> ScriptedEnvironment {
    let steps = (1..=ticks)
        .map(|tick| rewarding_step(tick, 0.9 - 0.1 * tick as f64))
        .collect();
    ScriptedEnvironment::new(&["gather", "wait"], make_observation(0, 1.0, 0.0, 0.0, 0.9), steps)
}

fn scripted_planner(ticks: u64) -> ScriptedPlanner {
    ScriptedPlanner::new((0..ticks).map(|_| make_plan("forage", &["gather"])).collect())
}

/// Three rewarded ticks grow `survival_playbook` one section per tick.
///
/// Execution sequence:
/// 1. Tick 1: store empty, plan sees no playbook context, delta applied
/// 2. Tick 2: plan sees the tick 1 tactic, second delta applied
/// 3. Tick 3: same again; stats and the audit log track all three
#[test]
fn applied_deltas_accumulate_and_feed_later_plans() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = PlaybookStore::open(temp.path().join("playbook"), PlaybookConfig::default())
        .expect("open store");
    let reflector = Reflector::heuristic(3);

    let mut env = scripted_env(3);
    let mut planner = scripted_planner(3);
    let engine = ExecutionEngine::new(env.action_schema().to_vec());
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");

    let snapshots = FeedbackLoop::new(
        &mut env,
        &mut planner,
        &engine,
        &state_formatter,
        &result_formatter,
        &reward,
        &mut memory,
    )
    .with_curation(CurationPipeline::new(&store, &reflector, Curator::new(3), 0))
    .run(3)
    .expect("run");

    assert_eq!(snapshots.len(), 3);
    for (index, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.playbook_updates.len(), 1, "tick {}", snapshot.tick);
        let update = &snapshot.playbook_updates[0];
        assert_eq!(update.status, DeltaDisposition::Applied);
        assert_eq!(update.target, "survival_playbook");
        let stats = snapshot.playbook_stats.expect("stats");
        assert_eq!(stats.files, 1);
        assert_eq!(stats.sections, index + 1);
    }

    // the context each plan saw trails the store by one tick
    assert!(planner.seen_memory[0].playbook.is_empty());
    assert!(planner.seen_memory[1].playbook[0].contains("## Tick 1 survival tactic"));
    assert!(planner.seen_memory[2].playbook[0].contains("## Tick 1 survival tactic"));

    let text = fs::read_to_string(store.root().join("current/survival_playbook.md"))
        .expect("playbook file");
    for tick in 1..=3 {
        assert!(text.contains(&format!("## Tick {tick} survival tactic")));
    }

    let log = fs::read_to_string(store.root().join("deltas/history.jsonl")).expect("audit log");
    let lines: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).expect("parse log line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|line| line["status"] == "applied"));
    assert_eq!(lines[2]["tick"], 3);
}

/// A delegate that repeats the same advice every tick gets through once;
/// the repeat is rejected as a duplicate without touching the store.
#[test]
fn repeated_delegate_advice_is_rejected_as_duplicate() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = PlaybookStore::open(temp.path().join("playbook"), PlaybookConfig::default())
        .expect("open store");
    let delegate = ScriptedDelegate::with_deltas(vec![make_delta(
        "survival_playbook",
        "always scan for hazards before moving",
        0.8,
    )]);
    let reflector = Reflector::with_delegate(3, Box::new(delegate));

    let mut env = scripted_env(2);
    let mut planner = scripted_planner(2);
    let engine = ExecutionEngine::new(env.action_schema().to_vec());
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");

    let snapshots = FeedbackLoop::new(
        &mut env,
        &mut planner,
        &engine,
        &state_formatter,
        &result_formatter,
        &reward,
        &mut memory,
    )
    .with_curation(CurationPipeline::new(&store, &reflector, Curator::new(3), 0))
    .run(2)
    .expect("run");

    assert_eq!(snapshots[0].playbook_updates[0].status, DeltaDisposition::Applied);
    let repeat = &snapshots[1].playbook_updates[0];
    assert_eq!(repeat.status, DeltaDisposition::Rejected);
    assert_eq!(repeat.reason.as_deref(), Some("duplicate_in_playbook"));
    assert!(
        snapshots[1].events.iter().any(|event| {
            event.severity == Severity::Warn
                && event.message == "Playbook delta rejected: survival_playbook"
        })
    );
    assert_eq!(snapshots[1].playbook_stats.expect("stats").sections, 1);

    let text = fs::read_to_string(store.root().join("current/survival_playbook.md"))
        .expect("playbook file");
    assert_eq!(text.matches("always scan for hazards").count(), 1);
    // rejections never reach the store, so the audit log has one line
    let log = fs::read_to_string(store.root().join("deltas/history.jsonl")).expect("audit log");
    assert_eq!(log.lines().count(), 1);
}

/// With a two-section cap and refine scheduled for tick 3, the third applied
/// tactic triggers pruning: the oldest section moves to the archive and the
/// refine event reports what was dropped.
#[test]
fn scheduled_refine_prunes_the_oldest_sections() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = PlaybookStore::open(
        temp.path().join("playbook"),
        PlaybookConfig {
            max_sections: 2,
            ..PlaybookConfig::default()
        },
    )
    .expect("open store");
    let reflector = Reflector::heuristic(3);

    let mut env = scripted_env(3);
    let mut planner = scripted_planner(3);
    let engine = ExecutionEngine::new(env.action_schema().to_vec());
    let state_formatter = StateFormatter::default();
    let result_formatter = ResultFormatter::default();
    let reward = RewardSynthesizer::default();
    let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");

    let snapshots = FeedbackLoop::new(
        &mut env,
        &mut planner,
        &engine,
        &state_formatter,
        &result_formatter,
        &reward,
        &mut memory,
    )
    .with_curation(CurationPipeline::new(&store, &reflector, Curator::new(3), 3))
    .run(3)
    .expect("run");

    let refined = snapshots[2]
        .events
        .iter()
        .find(|event| event.message == "Playbook refined: tick 3")
        .expect("refine event");
    assert_eq!(refined.fields["pruned_sections"], json!(1));
    assert_eq!(refined.fields["files"], json!(["survival_playbook.md"]));
    // stats are taken after the refine pass
    assert_eq!(snapshots[2].playbook_stats.expect("stats").sections, 2);

    let text = fs::read_to_string(store.root().join("current/survival_playbook.md"))
        .expect("playbook file");
    assert!(!text.contains("## Tick 1 survival tactic"));
    assert!(text.contains("## Tick 2 survival tactic"));
    assert!(text.contains("## Tick 3 survival tactic"));

    let archived: Vec<_> = fs::read_dir(store.root().join("archive"))
        .expect("read archive")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert_eq!(archived.len(), 1);
    let archived_text = fs::read_to_string(&archived[0]).expect("read archived");
    assert!(archived_text.contains("## Tick 1 survival tactic"));
}

/// Knowledge gathered in one run is available to the next: reopening the
/// store root yields the same stats and serves the stored tactic as context.
#[test]
fn playbook_survives_reopening_the_store() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("playbook");
    let stats_before = {
        let store =
            PlaybookStore::open(&root, PlaybookConfig::default()).expect("open store");
        let reflector = Reflector::heuristic(3);

        let mut env = scripted_env(1);
        let mut planner = scripted_planner(1);
        let engine = ExecutionEngine::new(env.action_schema().to_vec());
        let state_formatter = StateFormatter::default();
        let result_formatter = ResultFormatter::default();
        let reward = RewardSynthesizer::default();
        let mut memory = MemoryManager::open(temp.path().join("memory")).expect("open memory");

        let snapshots = FeedbackLoop::new(
            &mut env,
            &mut planner,
            &engine,
            &state_formatter,
            &result_formatter,
            &reward,
            &mut memory,
        )
        .with_curation(CurationPipeline::new(&store, &reflector, Curator::new(3), 0))
        .run(1)
        .expect("run");
        snapshots[0].playbook_stats.expect("stats")
    };

    let reopened = PlaybookStore::open(&root, PlaybookConfig::default()).expect("reopen store");
    assert_eq!(reopened.stats().expect("stats"), stats_before);
    let context = reopened.get_context().expect("context");
    assert!(context[0].contains("## Tick 1 survival tactic"));
}
