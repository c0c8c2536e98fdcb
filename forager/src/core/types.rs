//! Shared records exchanged between the loop and its collaborators.
//!
//! These types define stable contracts between core components. They carry no
//! behavior beyond small accessors and must serialize deterministically:
//! maps are `BTreeMap`, enums are lowercase strings, timestamps are UTC
//! ISO-8601.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event bus channel an observability payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    State,
    Actions,
    Metrics,
    Events,
    Logs,
}

/// Severity attached to an observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One timestamped, channel-tagged observability payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub channel: Channel,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
}

impl Event {
    pub fn new(channel: Channel, severity: Severity, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), channel, severity, message)
    }

    /// Build an event with an explicit timestamp so a batch can share one.
    pub fn at(
        timestamp: DateTime<Utc>,
        channel: Channel,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            channel,
            severity,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// Named world signals guaranteed by every environment.
///
/// The four scalar signals are always present; anything else the environment
/// wants to report rides along in `extra` (the grid world adds `position`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signals {
    pub life: f64,
    pub resources: f64,
    pub danger: f64,
    pub unknown: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One sample of world state as produced by the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tick: u64,
    pub data: Signals,
    pub reward: f64,
    pub done: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, Value>,
}

impl Observation {
    /// Placeholder observation used when no environment step ever happened.
    pub fn null() -> Self {
        Self {
            tick: 0,
            data: Signals::default(),
            reward: 0.0,
            done: false,
            info: BTreeMap::new(),
        }
    }
}

/// One primitive action the planner wants executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    pub confidence: f64,
    pub risk_estimate: f64,
}

impl ActionCandidate {
    pub fn new(action_id: impl Into<String>, confidence: f64, risk_estimate: f64) -> Self {
        Self {
            action_id: action_id.into(),
            parameters: BTreeMap::new(),
            confidence,
            risk_estimate,
        }
    }
}

/// Ordered intent for one tick; `actions` order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ActionPlan {
    /// A plan that asks for nothing; the engine falls back to `wait`.
    pub fn idle(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            sub_goals: Vec::new(),
            actions: Vec::new(),
            notes: None,
        }
    }
}

/// One executed (or blocked) action with its outcome detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub detail: String,
    pub risk: f64,
}

/// Outcome of executing one plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub successes: Vec<ActionRecord>,
    pub failures: Vec<ActionRecord>,
    pub warnings: Vec<String>,
    pub interrupted: bool,
}

/// Reward composition for one tick.
///
/// `external_reward` is always the summed environment reward for the tick,
/// never recomputed independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub external_reward: f64,
    pub internal_reward: f64,
    pub components: BTreeMap<String, f64>,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.external_reward + self.internal_reward
    }
}

/// Forward-looking bias the planner hands back after reflecting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextBias {
    pub risk_tolerance: f64,
    pub explore_priority: f64,
}

impl Default for NextBias {
    fn default() -> Self {
        Self {
            risk_tolerance: 0.4,
            explore_priority: 0.5,
        }
    }
}

/// Planner's post-hoc analysis of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fear_updates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curiosity_updates: Vec<String>,
    #[serde(default)]
    pub next_bias: NextBias,
}

/// Structured slot view of one observation, for prompt assembly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSlots {
    pub tick: u64,
    pub life: f64,
    pub resources: f64,
    pub danger: f64,
    pub unknown: f64,
    pub recent_events: String,
}

/// LLM-facing view of the current world state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormattedState {
    pub summary: String,
    pub slots: StateSlots,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_highlights: Vec<String>,
}

/// Condensed execution outcome handed to the planner for reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub reward: f64,
    pub state_change: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Memory notes handed to the planner alongside the formatted state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryExport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploration: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playbook: Vec<String>,
}

/// Aggregate counters over the playbook's live files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybookStats {
    pub files: usize,
    pub sections: usize,
    pub characters: usize,
}

/// Full record of one tick, appended to the run's snapshot sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSnapshot {
    pub tick: u64,
    pub observation: Observation,
    pub formatted_state: FormattedState,
    pub action_plan: ActionPlan,
    pub execution: ExecutionResult,
    pub reward: RewardBreakdown,
    pub reflection: Reflection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playbook_updates: Vec<crate::ace::DeltaRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_stats: Option<PlaybookStats>,
}
