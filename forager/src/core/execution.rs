//! Whitelisted plan execution against an environment.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::{
    ActionPlan, ActionRecord, Channel, Event, ExecutionResult, Observation, Severity,
};
use crate::env::Environment;

/// Everything one plan execution produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub result: ExecutionResult,
    /// The last observation seen; never absent.
    pub observation: Observation,
    /// Sum of per-step environment rewards for the tick.
    pub reward: f64,
    /// Every intermediate observation, in step order.
    pub steps: Vec<Observation>,
}

/// Executes plans against a fixed action whitelist.
///
/// Holds no state besides the whitelist; candidates outside it are recorded
/// as failures without ever reaching the environment.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    allowed: BTreeSet<String>,
}

impl ExecutionEngine {
    pub fn new<I>(whitelist: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            allowed: whitelist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, action_id: &str) -> bool {
        self.allowed.contains(action_id)
    }

    /// Run the plan's candidates in order; see the failure/fallback ladder in
    /// the match arms below. Always returns a final observation.
    pub fn execute<E: Environment + ?Sized>(
        &self,
        environment: &mut E,
        plan: &ActionPlan,
    ) -> ExecutionOutcome {
        let mut result = ExecutionResult::default();
        let mut steps: Vec<Observation> = Vec::new();
        let mut reward = 0.0;

        for candidate in &plan.actions {
            if !self.allows(&candidate.action_id) {
                debug!(action = %candidate.action_id, "action blocked by whitelist");
                result.failures.push(ActionRecord {
                    action: candidate.action_id.clone(),
                    detail: "blocked - not in whitelist".to_string(),
                    risk: candidate.risk_estimate,
                });
                continue;
            }
            let observation = environment.step(&candidate.action_id, &candidate.parameters);
            reward += observation.reward;
            result.successes.push(ActionRecord {
                action: candidate.action_id.clone(),
                detail: params_detail(&candidate.parameters),
                risk: candidate.risk_estimate,
            });
            if candidate.risk_estimate > 0.7 {
                result.warnings.push(format!(
                    "High risk action {} (risk={:.2})",
                    candidate.action_id, candidate.risk_estimate
                ));
            }
            let done = observation.done;
            steps.push(observation);
            if done {
                result.warnings.push("Environment reached terminal state.".to_string());
                result.interrupted = true;
                break;
            }
        }

        if plan.actions.is_empty() {
            if self.allows("wait") {
                let observation = environment.step("wait", &BTreeMap::new());
                reward += observation.reward;
                steps.push(observation);
                result.successes.push(ActionRecord {
                    action: "wait".to_string(),
                    detail: "auto wait".to_string(),
                    risk: 0.0,
                });
            } else {
                result.failures.push(ActionRecord {
                    action: "wait".to_string(),
                    detail: "no wait action available".to_string(),
                    risk: 0.0,
                });
            }
        }

        // Every candidate may have been blocked; the loop still needs an
        // observation to advance on.
        if steps.is_empty() {
            if self.allows("wait") {
                let observation = environment.step("wait", &BTreeMap::new());
                reward += observation.reward;
                steps.push(observation);
            } else {
                steps.push(Observation::null());
            }
        }

        let observation = steps.last().cloned().unwrap_or_else(Observation::null);
        ExecutionOutcome {
            result,
            observation,
            reward,
            steps,
        }
    }

    /// Derive the observability events for one (plan, result) pair.
    ///
    /// All events from one derivation share a single timestamp.
    pub fn emit_events(&self, plan: &ActionPlan, result: &ExecutionResult) -> Vec<Event> {
        let stamp = Utc::now();
        let action_ids: Vec<&str> = plan
            .actions
            .iter()
            .map(|candidate| candidate.action_id.as_str())
            .collect();
        let mut events = vec![
            Event::at(stamp, Channel::Actions, Severity::Info, plan.intent.clone())
                .with_field("actions", json!(action_ids)),
        ];
        for success in &result.successes {
            events.push(Event::at(
                stamp,
                Channel::Logs,
                Severity::Info,
                format!("action {} completed", success.action),
            ));
        }
        for warning in &result.warnings {
            events.push(Event::at(stamp, Channel::Events, Severity::Warn, warning.clone()));
        }
        for failure in &result.failures {
            events.push(Event::at(
                stamp,
                Channel::Events,
                Severity::Error,
                format!("{} blocked", failure.action),
            ));
        }
        events
    }
}

fn params_detail(parameters: &BTreeMap<String, Value>) -> String {
    let object: serde_json::Map<String, Value> = parameters
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    format!("params={}", Value::Object(object))
}
