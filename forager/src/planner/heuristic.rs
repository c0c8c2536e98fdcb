//! Built-in survival heuristic, also the fallback behind the delegate.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::types::{
    ActionCandidate, ActionPlan, FormattedState, MemoryExport, NextBias, Reflection, ResultSummary,
    RewardBreakdown,
};
use crate::planner::Planner;

const DEFAULT_SEED: u64 = 42;

/// Rule-based planner. Flees when danger is high, maps tiles while the map
/// is unknown, gathers whenever it can, and waits out everything else.
pub struct HeuristicPlanner {
    rng: StdRng,
}

impl HeuristicPlanner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for HeuristicPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Planner for HeuristicPlanner {
    fn plan(
        &mut self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> ActionPlan {
        let danger = state.slots.danger;
        let unknown = state.slots.unknown;

        let intent = if danger > 0.6 {
            "preserve life"
        } else {
            "explore unknown"
        };

        let mut sub_goals = Vec::new();
        if intent == "preserve life" {
            sub_goals.push("exit hazardous zone".to_string());
        }
        if unknown > 0.3 {
            sub_goals.push("map unexplored tiles".to_string());
        }
        if state.slots.resources < 0.5 {
            sub_goals.push("gather resources".to_string());
        }

        let move_actions: Vec<&String> = allowed_actions
            .iter()
            .filter(|action| action.starts_with("move_"))
            .collect();

        let mut actions = Vec::new();
        if intent == "preserve life" {
            if let Some(id) = move_actions.choose(&mut self.rng) {
                let risk = if danger > 0.0 { danger.min(0.9) } else { 0.2 };
                actions.push(ActionCandidate::new(id.as_str(), 0.7, risk));
            }
        } else if unknown > 0.1 {
            if let Some(id) = move_actions.choose(&mut self.rng) {
                let risk = if danger > 0.0 { danger } else { 0.1 };
                actions.push(ActionCandidate::new(id.as_str(), 0.6, risk));
            }
        }

        if allowed_actions.iter().any(|action| action == "gather") {
            actions.push(ActionCandidate::new("gather", 0.4, 0.2));
        }

        if actions.is_empty() {
            if let Some(id) = allowed_actions.choose(&mut self.rng) {
                let risk = if danger > 0.0 { danger } else { 0.1 };
                actions.push(ActionCandidate::new(id.as_str(), 0.3, risk));
            }
        }

        let mut notes = String::new();
        if let Some(last) = memory.alert.last() {
            notes.push_str(&format!("Recent alert: {last}. "));
        }
        if let Some(last) = memory.exploration.last() {
            notes.push_str(&format!("Exploration focus: {last}."));
        }
        let notes = notes.trim().to_string();

        ActionPlan {
            intent: intent.to_string(),
            sub_goals,
            actions,
            notes: (!notes.is_empty()).then_some(notes),
        }
    }

    fn reflect(&mut self, summary: &ResultSummary, reward: &RewardBreakdown) -> Reflection {
        let reward_total = reward.total();
        let fear_updates = if reward_total < -0.1 {
            vec![format!(
                "Loss observed, adjust plan. External={:.2}",
                reward.external_reward
            )]
        } else {
            vec![format!("Stable. External={:.2}", reward.external_reward)]
        };

        let curiosity_signal = reward
            .components
            .get("internal_curiosity")
            .copied()
            .unwrap_or(0.0);
        let curiosity_updates = vec![format!("Curiosity delta {curiosity_signal:.2}")];

        let next_bias = NextBias {
            risk_tolerance: if reward_total < 0.0 { 0.3 } else { 0.5 },
            explore_priority: if curiosity_signal > 0.1 { 0.7 } else { 0.4 },
        };

        Reflection {
            summary: format!(
                "Reward={:.2}, state_change={}, successes={}, failures={}",
                reward_total,
                summary.state_change,
                summary.successes.len(),
                summary.failures.len()
            ),
            fear_updates,
            curiosity_updates,
            next_bias,
        }
    }
}
