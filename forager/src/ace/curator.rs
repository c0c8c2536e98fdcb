//! Ranks, bounds and deduplicates proposed deltas before they reach the
//! store.

use crate::ace::delta::{CurationResult, PlaybookDelta, RejectedDelta};
use crate::ace::playbook::PlaybookStore;

/// Decides which proposed deltas may be persisted this tick.
#[derive(Debug, Clone, Copy)]
pub struct Curator {
    /// Accepted deltas per batch; minimum 1.
    pub max_per_tick: usize,
}

impl Default for Curator {
    fn default() -> Self {
        Self { max_per_tick: 3 }
    }
}

impl Curator {
    pub fn new(max_per_tick: usize) -> Self {
        Self {
            max_per_tick: max_per_tick.max(1),
        }
    }

    /// Sort by priority descending (stable, so equal priorities keep their
    /// proposal order), then walk the batch. The check order is part of the
    /// contract: once the cap is reached everything left is rejected with
    /// `max_per_tick_reached`; before that, empty or duplicate candidates
    /// are rejected without consuming a cap slot.
    pub fn curate(&self, deltas: Vec<PlaybookDelta>, store: &PlaybookStore) -> CurationResult {
        let mut ranked = deltas;
        ranked.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        let mut result = CurationResult::default();
        for delta in ranked {
            if result.accepted.len() >= self.max_per_tick {
                result.rejected.push(RejectedDelta {
                    delta,
                    reason: "max_per_tick_reached".to_string(),
                });
                continue;
            }
            if delta.content.trim().is_empty() {
                result.rejected.push(RejectedDelta {
                    delta,
                    reason: "empty_content".to_string(),
                });
                continue;
            }
            if store.contains(&delta) {
                result.rejected.push(RejectedDelta {
                    delta,
                    reason: "duplicate_in_playbook".to_string(),
                });
                continue;
            }
            result.accepted.push(delta);
        }
        result
    }
}
