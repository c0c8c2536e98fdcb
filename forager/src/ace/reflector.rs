//! Turns a finished tick into proposed playbook deltas.

use tracing::{debug, warn};

use crate::ace::delta::{ChangeType, PlaybookDelta};
use crate::core::types::LoopSnapshot;
use crate::planner::Delegate;

/// Proposes knowledge deltas from a tick's snapshot.
///
/// With a delegate attached it asks the external agent first and falls back
/// to the built-in heuristic on any failure or empty answer; `propose`
/// itself never fails.
pub struct Reflector {
    max_items: usize,
    delegate: Option<Box<dyn Delegate>>,
}

impl Reflector {
    pub fn heuristic(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            delegate: None,
        }
    }

    pub fn with_delegate(max_items: usize, delegate: Box<dyn Delegate>) -> Self {
        Self {
            max_items: max_items.max(1),
            delegate: Some(delegate),
        }
    }

    pub fn propose(
        &self,
        snapshot: &LoopSnapshot,
        playbook_context: &[String],
    ) -> Vec<PlaybookDelta> {
        if let Some(delegate) = &self.delegate {
            match delegate.generate_deltas(snapshot, playbook_context) {
                Ok(deltas) if !deltas.is_empty() => {
                    let mut deltas = deltas;
                    deltas.truncate(self.max_items);
                    return deltas;
                }
                Ok(_) => debug!(tick = snapshot.tick, "delegate proposed no deltas"),
                Err(err) => {
                    warn!(
                        tick = snapshot.tick,
                        error = %err,
                        "delta delegation failed, using heuristic"
                    );
                }
            }
        }
        self.heuristic_deltas(snapshot, playbook_context)
    }

    fn heuristic_deltas(
        &self,
        snapshot: &LoopSnapshot,
        playbook_context: &[String],
    ) -> Vec<PlaybookDelta> {
        let mut deltas = Vec::new();
        let reward_total = snapshot.reward.total();
        let context_note: String = playbook_context
            .first()
            .map(|entry| entry.chars().take(160).collect())
            .unwrap_or_default();

        if !snapshot.execution.successes.is_empty() && reward_total > 0.0 {
            let actions = snapshot
                .execution
                .successes
                .iter()
                .map(|record| record.action.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let mut lines = vec![
                format!("## Tick {} survival tactic", snapshot.tick),
                format!("- Situation: {}", snapshot.formatted_state.summary),
                format!("- Actions: {actions}"),
                format!(
                    "- Reward: external={:.3}, internal={:.3}",
                    snapshot.reward.external_reward, snapshot.reward.internal_reward
                ),
                format!("- Reflection: {}", snapshot.reflection.summary),
            ];
            if !context_note.is_empty() {
                lines.push(format!("- Playbook excerpt: {context_note}"));
            }
            deltas.push(PlaybookDelta {
                target: "survival_playbook".to_string(),
                change_type: ChangeType::Add,
                content: lines.join("\n"),
                evidence: snapshot.execution.warnings.iter().take(2).cloned().collect(),
                priority: (0.5 + reward_total).min(0.9),
                tags: vec!["success".to_string(), "tactics".to_string()],
            });
        }

        if !snapshot.execution.failures.is_empty() || !snapshot.execution.warnings.is_empty() {
            let bias = snapshot.reflection.next_bias;
            let mut lines = vec![
                format!("## Tick {} alert notes", snapshot.tick),
                format!("- Situation: {}", snapshot.formatted_state.summary),
            ];
            for failure in snapshot.execution.failures.iter().take(3) {
                lines.push(format!("- Action {} failed: {}", failure.action, failure.detail));
            }
            for warning in snapshot.execution.warnings.iter().take(2) {
                lines.push(format!("- Warning: {warning}"));
            }
            lines.push(format!(
                "- Next bias: risk_tolerance={:.2}, explore_priority={:.2}",
                bias.risk_tolerance, bias.explore_priority
            ));
            if !context_note.is_empty() {
                lines.push(format!("- Playbook excerpt: {context_note}"));
            }
            deltas.push(PlaybookDelta {
                target: "alert_notes".to_string(),
                change_type: ChangeType::Add,
                content: lines.join("\n"),
                evidence: vec![snapshot.formatted_state.summary.clone()],
                priority: 0.6,
                tags: vec!["alert".to_string(), "risk".to_string()],
            });
        }

        deltas.truncate(self.max_items);
        deltas
    }
}
