//! Test-only helpers: deterministic record constructors and scripted
//! collaborator doubles.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;

use crate::ace::{ChangeType, PlaybookDelta};
use crate::core::types::{
    ActionCandidate, ActionPlan, ExecutionResult, FormattedState, LoopSnapshot, MemoryExport,
    NextBias, Observation, Reflection, ResultSummary, RewardBreakdown, Signals, StateSlots,
};
use crate::env::Environment;
use crate::planner::{Delegate, DelegateError, PlanBundle, Planner};

/// Create an observation with the four core signals and no reward.
pub fn make_observation(
    tick: u64,
    life: f64,
    resources: f64,
    danger: f64,
    unknown: f64,
) -> Observation {
    Observation {
        tick,
        data: Signals {
            life,
            resources,
            danger,
            unknown,
            events: Vec::new(),
            extra: BTreeMap::new(),
        },
        reward: 0.0,
        done: false,
        info: BTreeMap::new(),
    }
}

/// Create a plan whose candidates all share one confidence/risk pair.
pub fn make_plan(intent: &str, action_ids: &[&str]) -> ActionPlan {
    ActionPlan {
        intent: intent.to_string(),
        sub_goals: Vec::new(),
        actions: action_ids
            .iter()
            .map(|id| ActionCandidate::new(*id, 0.5, 0.1))
            .collect(),
        notes: None,
    }
}

/// Create an `add` delta with deterministic evidence and tags.
pub fn make_delta(target: &str, content: &str, priority: f64) -> PlaybookDelta {
    PlaybookDelta {
        target: target.to_string(),
        change_type: ChangeType::Add,
        content: content.to_string(),
        evidence: Vec::new(),
        priority,
        tags: vec!["test".to_string()],
    }
}

/// Create a snapshot with empty outcomes around the given observation.
pub fn make_snapshot(observation: Observation) -> LoopSnapshot {
    let formatted = FormattedState {
        summary: format!("Tick {}", observation.tick),
        slots: StateSlots {
            tick: observation.tick,
            life: observation.data.life,
            resources: observation.data.resources,
            danger: observation.data.danger,
            unknown: observation.data.unknown,
            recent_events: String::new(),
        },
        memory_highlights: Vec::new(),
    };
    LoopSnapshot {
        tick: observation.tick,
        observation,
        formatted_state: formatted,
        action_plan: ActionPlan::idle("test"),
        execution: ExecutionResult::default(),
        reward: RewardBreakdown {
            external_reward: 0.0,
            internal_reward: 0.0,
            components: BTreeMap::new(),
        },
        reflection: Reflection {
            summary: "test reflection".to_string(),
            fear_updates: Vec::new(),
            curiosity_updates: Vec::new(),
            next_bias: NextBias::default(),
        },
        events: Vec::new(),
        playbook_updates: Vec::new(),
        playbook_stats: None,
    }
}

/// Environment double that replays queued observations and records calls.
pub struct ScriptedEnvironment {
    schema: Vec<String>,
    reset_observation: Observation,
    steps: VecDeque<Observation>,
    /// Action ids in the order the engine called `step`.
    pub step_calls: Vec<String>,
}

impl ScriptedEnvironment {
    pub fn new(schema: &[&str], reset_observation: Observation, steps: Vec<Observation>) -> Self {
        Self {
            schema: schema.iter().map(|s| s.to_string()).collect(),
            reset_observation,
            steps: steps.into(),
            step_calls: Vec::new(),
        }
    }
}

impl Environment for ScriptedEnvironment {
    fn reset(&mut self) -> Observation {
        self.step_calls.clear();
        self.reset_observation.clone()
    }

    fn step(&mut self, action_id: &str, _parameters: &BTreeMap<String, Value>) -> Observation {
        self.step_calls.push(action_id.to_string());
        self.steps
            .pop_front()
            .expect("scripted environment ran out of step observations")
    }

    fn action_schema(&self) -> &[String] {
        &self.schema
    }
}

/// Planner double that replays queued plans and counts reflections.
pub struct ScriptedPlanner {
    plans: VecDeque<ActionPlan>,
    pub reflect_calls: usize,
    /// Memory exports seen by `plan`, for asserting playbook folding.
    pub seen_memory: Vec<MemoryExport>,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<ActionPlan>) -> Self {
        Self {
            plans: plans.into(),
            reflect_calls: 0,
            seen_memory: Vec::new(),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn plan(
        &mut self,
        _state: &FormattedState,
        _allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> ActionPlan {
        self.seen_memory.push(memory.clone());
        self.plans
            .pop_front()
            .expect("scripted planner ran out of plans")
    }

    fn reflect(&mut self, _summary: &ResultSummary, reward: &RewardBreakdown) -> Reflection {
        self.reflect_calls += 1;
        Reflection {
            summary: format!("scripted reflection total={:.2}", reward.total()),
            fear_updates: vec!["scripted fear note".to_string()],
            curiosity_updates: vec!["scripted curiosity note".to_string()],
            next_bias: NextBias::default(),
        }
    }
}

/// Delegate double that answers from a fixed script instead of a child
/// process.
pub struct ScriptedDelegate {
    bundle: Result<PlanBundle, DelegateError>,
    deltas: Result<Vec<PlaybookDelta>, DelegateError>,
}

impl ScriptedDelegate {
    pub fn with_plan(plan: ActionPlan, reflection: Option<Reflection>) -> Self {
        Self {
            bundle: Ok(PlanBundle {
                plan: Some(plan),
                reflection,
            }),
            deltas: Ok(Vec::new()),
        }
    }

    pub fn with_deltas(deltas: Vec<PlaybookDelta>) -> Self {
        Self {
            bundle: Ok(PlanBundle::default()),
            deltas: Ok(deltas),
        }
    }

    pub fn failing(error: DelegateError) -> Self {
        Self {
            bundle: Err(error.clone()),
            deltas: Err(error),
        }
    }
}

impl Delegate for ScriptedDelegate {
    fn generate_plan(
        &self,
        _state: &FormattedState,
        _allowed_actions: &[String],
        _memory: &MemoryExport,
    ) -> Result<PlanBundle, DelegateError> {
        self.bundle.clone()
    }

    fn generate_deltas(
        &self,
        _snapshot: &LoopSnapshot,
        _playbook_context: &[String],
    ) -> Result<Vec<PlaybookDelta>, DelegateError> {
        self.deltas.clone()
    }
}
