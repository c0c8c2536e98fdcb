//! Execution-outcome shaping for the planner's reflect step.

use crate::core::types::{ActionRecord, ExecutionResult, Observation, ResultSummary};

/// Condenses an execution result into the short lists reflection works from.
#[derive(Debug, Clone, Copy)]
pub struct ResultFormatter {
    pub max_entries: usize,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self { max_entries: 5 }
    }
}

impl ResultFormatter {
    pub fn build_summary(
        &self,
        observation: &Observation,
        result: &ExecutionResult,
    ) -> ResultSummary {
        let data = &observation.data;
        let state_change = format!(
            "life={}, resources={}, danger={}, unknown={}",
            data.life, data.resources, data.danger, data.unknown
        );
        ResultSummary {
            reward: observation.reward,
            state_change,
            successes: describe(&result.successes, self.max_entries),
            failures: describe(&result.failures, self.max_entries),
            warnings: result.warnings.iter().take(self.max_entries).cloned().collect(),
        }
    }
}

fn describe(records: &[ActionRecord], limit: usize) -> Vec<String> {
    records
        .iter()
        .take(limit)
        .map(|record| format!("{}: {}", record.action, record.detail))
        .collect()
}
