//! Bridge to an external agent CLI for plans and playbook deltas.
//!
//! The delegate speaks JSON over stdin/stdout. Responses are validated
//! against the bundled schemas under `schemas/` and then coerced field by
//! field, so a sloppy but recognizable answer still yields a usable plan.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use jsonschema::validator_for;
use minijinja::{Environment, context};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::ace::{ChangeType, PlaybookDelta};
use crate::core::types::{
    ActionCandidate, ActionPlan, FormattedState, LoopSnapshot, MemoryExport, NextBias, Reflection,
    ResultSummary, RewardBreakdown,
};
use crate::planner::Planner;
use crate::planner::heuristic::HeuristicPlanner;
use crate::planner::process::run_command_with_timeout;

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const DELTAS_TEMPLATE: &str = include_str!("prompts/deltas.md");
const PLAN_SCHEMA: &str = include_str!("../../schemas/plan_response.schema.json");
const DELTA_SCHEMA: &str = include_str!("../../schemas/delta_response.schema.json");

/// Upper bound on captured delegate output.
const OUTPUT_LIMIT_BYTES: usize = 512 * 1024;

/// Ways a delegate call can fail. Callers treat every variant the same
/// (fall back to the heuristic), the split exists for logs and tests.
#[derive(Debug, Clone, Error)]
pub enum DelegateError {
    #[error("failed to run delegate: {0}")]
    Spawn(String),
    #[error("delegate timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("delegate exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("malformed delegate response: {0}")]
    Malformed(String),
}

/// Parsed delegate answer. Either half may be missing; a missing plan sends
/// the planner to its heuristic fallback.
#[derive(Debug, Clone, Default)]
pub struct PlanBundle {
    pub plan: Option<ActionPlan>,
    pub reflection: Option<Reflection>,
}

/// External brain the planner and reflector can hand work to.
pub trait Delegate {
    fn generate_plan(
        &self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> Result<PlanBundle, DelegateError>;

    fn generate_deltas(
        &self,
        snapshot: &LoopSnapshot,
        playbook_context: &[String],
    ) -> Result<Vec<PlaybookDelta>, DelegateError>;
}

/// Delegate backed by the Claude Code CLI. The prompt goes in on stdin and
/// a single JSON object is expected back on stdout.
#[derive(Debug, Clone)]
pub struct CliDelegate {
    pub binary: String,
    pub model: String,
    pub timeout_secs: u64,
    pub skip_permissions: bool,
    pub extra_args: Vec<String>,
    /// Hint rendered into the delta prompt; the reflector still enforces
    /// its own cap on whatever comes back.
    pub max_items: usize,
}

impl Default for CliDelegate {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "claude-4-5-sonnet-latest".to_string(),
            timeout_secs: 90,
            skip_permissions: true,
            extra_args: Vec::new(),
            max_items: 3,
        }
    }
}

impl CliDelegate {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("code")
            .args(["--model", &self.model])
            .args(["--output-format", "json"]);
        if self.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        cmd.args(&self.extra_args);
        cmd
    }

    fn invoke(&self, prompt: &str) -> Result<Value, DelegateError> {
        let output = run_command_with_timeout(
            self.command(),
            Some(prompt.as_bytes()),
            Duration::from_secs(self.timeout_secs),
            OUTPUT_LIMIT_BYTES,
        )
        .map_err(|err| DelegateError::Spawn(err.to_string()))?;

        if output.timed_out {
            return Err(DelegateError::Timeout {
                secs: self.timeout_secs,
            });
        }
        if !output.status.success() {
            return Err(DelegateError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_response(stdout.trim())
    }
}

impl Delegate for CliDelegate {
    #[instrument(skip_all, fields(binary = %self.binary, model = %self.model))]
    fn generate_plan(
        &self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> Result<PlanBundle, DelegateError> {
        let prompt = render_plan_prompt(state, allowed_actions, memory);
        let value = self.invoke(&prompt)?;
        validate_response(&value, PLAN_SCHEMA, "plan")?;

        let plan = value.get("plan").and_then(Value::as_object).map(plan_from_value);
        let reflection = value
            .get("reflection")
            .and_then(Value::as_object)
            .map(reflection_from_value);
        debug!(
            has_plan = plan.is_some(),
            has_reflection = reflection.is_some(),
            "delegate answered"
        );
        Ok(PlanBundle { plan, reflection })
    }

    #[instrument(skip_all, fields(binary = %self.binary, tick = snapshot.tick))]
    fn generate_deltas(
        &self,
        snapshot: &LoopSnapshot,
        playbook_context: &[String],
    ) -> Result<Vec<PlaybookDelta>, DelegateError> {
        let prompt = render_deltas_prompt(snapshot, playbook_context, self.max_items);
        let value = self.invoke(&prompt)?;
        validate_response(&value, DELTA_SCHEMA, "delta")?;

        let deltas = value
            .get("deltas")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(delta_from_value)
                    .collect()
            })
            .unwrap_or_default();
        Ok(deltas)
    }
}

/// Planner that asks a delegate first and falls back to the built-in
/// heuristic when the delegate fails or returns no plan. A reflection that
/// arrived together with a plan is cached and served on the next `reflect`.
pub struct DelegatedPlanner {
    delegate: Box<dyn Delegate>,
    fallback: HeuristicPlanner,
    cached_reflection: Option<Reflection>,
}

impl DelegatedPlanner {
    pub fn new(delegate: Box<dyn Delegate>, fallback: HeuristicPlanner) -> Self {
        Self {
            delegate,
            fallback,
            cached_reflection: None,
        }
    }
}

impl Planner for DelegatedPlanner {
    fn plan(
        &mut self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> ActionPlan {
        match self.delegate.generate_plan(state, allowed_actions, memory) {
            Ok(PlanBundle {
                plan: Some(plan),
                reflection,
            }) => {
                self.cached_reflection = reflection;
                return plan;
            }
            Ok(_) => debug!("delegate returned no plan, using heuristic"),
            Err(err) => warn!(error = %err, "plan delegation failed, using heuristic"),
        }
        self.cached_reflection = None;
        self.fallback.plan(state, allowed_actions, memory)
    }

    fn reflect(&mut self, summary: &ResultSummary, reward: &RewardBreakdown) -> Reflection {
        if let Some(reflection) = self.cached_reflection.take() {
            return reflection;
        }
        self.fallback.reflect(summary, reward)
    }
}

fn render_plan_prompt(
    state: &FormattedState,
    allowed_actions: &[String],
    memory: &MemoryExport,
) -> String {
    let mut env = Environment::new();
    env.add_template("plan", PLAN_TEMPLATE)
        .expect("plan template should be valid");
    let template = env.get_template("plan").expect("plan template registered");
    template
        .render(context! {
            summary => state.summary.trim(),
            slots => encode(&state.slots),
            highlights => state.memory_highlights,
            actions => encode(&allowed_actions),
            memory => encode(memory),
        })
        .expect("plan prompt rendering should not fail")
}

fn render_deltas_prompt(
    snapshot: &LoopSnapshot,
    playbook_context: &[String],
    max_items: usize,
) -> String {
    let payload = json!({
        "tick": snapshot.tick,
        "state_summary": snapshot.formatted_state.summary,
        "state_slots": snapshot.formatted_state.slots,
        "actions": snapshot
            .execution
            .successes
            .iter()
            .map(|record| record.action.clone())
            .collect::<Vec<_>>(),
        "successes": snapshot.execution.successes,
        "failures": snapshot.execution.failures,
        "warnings": snapshot.execution.warnings,
        "reward": {
            "external": snapshot.reward.external_reward,
            "internal": snapshot.reward.internal_reward,
            "total": snapshot.reward.total(),
        },
        "reflection": {
            "summary": snapshot.reflection.summary,
            "updates": {
                "alert": snapshot.reflection.fear_updates,
                "exploration": snapshot.reflection.curiosity_updates,
            },
        },
    });

    let mut env = Environment::new();
    env.add_template("deltas", DELTAS_TEMPLATE)
        .expect("deltas template should be valid");
    let template = env
        .get_template("deltas")
        .expect("deltas template registered");
    template
        .render(context! {
            payload => encode(&payload),
            context => playbook_context,
            max_items => max_items,
        })
        .expect("deltas prompt rendering should not fail")
}

fn encode<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("prompt payload should serialize")
}

/// Parse stdout as JSON, falling back to the first `{..}` blob when the
/// delegate wrapped the object in prose.
fn parse_response(text: &str) -> Result<Value, DelegateError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    let blob = extract_json_blob(text)
        .ok_or_else(|| DelegateError::Malformed("no JSON object in response".to_string()))?;
    serde_json::from_str(blob).map_err(|err| DelegateError::Malformed(err.to_string()))
}

fn extract_json_blob(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn validate_response(value: &Value, schema_raw: &str, label: &str) -> Result<(), DelegateError> {
    let schema: Value = serde_json::from_str(schema_raw)
        .map_err(|err| DelegateError::Malformed(format!("parse {label} schema: {err}")))?;
    let compiled = validator_for(&schema)
        .map_err(|err| DelegateError::Malformed(format!("invalid {label} schema: {err}")))?;
    let messages = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        return Err(DelegateError::Malformed(format!(
            "{label} response rejected: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

fn plan_from_value(data: &Map<String, Value>) -> ActionPlan {
    let actions = data
        .get("actions")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_object)
                .map(candidate_from_value)
                .collect()
        })
        .unwrap_or_default();
    ActionPlan {
        intent: string_or(data.get("intent"), "unknown"),
        sub_goals: string_list(data.get("sub_goals")),
        actions,
        notes: data.get("notes").and_then(Value::as_str).map(str::to_string),
    }
}

fn candidate_from_value(entry: &Map<String, Value>) -> ActionCandidate {
    ActionCandidate {
        action_id: string_or(entry.get("action_id"), "wait"),
        parameters: parameters_from_value(entry.get("parameters")),
        confidence: float_or(entry.get("confidence"), 0.5),
        risk_estimate: float_or(entry.get("risk_estimate"), 0.5),
    }
}

fn reflection_from_value(data: &Map<String, Value>) -> Reflection {
    let bias = data.get("next_bias").and_then(Value::as_object);
    Reflection {
        summary: string_or(data.get("summary"), ""),
        fear_updates: string_list(data.get("fear_updates")),
        curiosity_updates: string_list(data.get("curiosity_updates")),
        next_bias: NextBias {
            risk_tolerance: float_or(bias.and_then(|b| b.get("risk_tolerance")), 0.4),
            explore_priority: float_or(bias.and_then(|b| b.get("explore_priority")), 0.5),
        },
    }
}

/// Entries without usable content are dropped rather than failing the batch.
fn delta_from_value(entry: &Map<String, Value>) -> Option<PlaybookDelta> {
    let content = string_or(entry.get("content"), "");
    let content = content.trim().to_string();
    if content.is_empty() {
        return None;
    }
    Some(PlaybookDelta {
        target: string_or(entry.get("target"), "general"),
        change_type: change_type_from_value(entry.get("change_type")),
        content,
        evidence: string_list(entry.get("evidence")),
        priority: float_or(entry.get("priority"), 0.5),
        tags: string_list(entry.get("tags")),
    })
}

fn change_type_from_value(value: Option<&Value>) -> ChangeType {
    match value {
        None => ChangeType::Add,
        Some(v) => serde_json::from_value(v.clone()).unwrap_or(ChangeType::Unsupported),
    }
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    value.and_then(Value::as_str).unwrap_or(default).to_string()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn float_or(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(default)
}

fn parameters_from_value(value: Option<&Value>) -> BTreeMap<String, Value> {
    value
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
