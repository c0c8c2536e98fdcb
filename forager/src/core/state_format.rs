//! Observation-to-prompt shaping for the planner.

use crate::core::types::{FormattedState, Observation, StateSlots};

/// Renders an observation into the summary/slots view planners consume.
#[derive(Debug, Clone, Copy)]
pub struct StateFormatter {
    /// Caps both the inline-event join and the memory highlight list.
    pub max_slot_items: usize,
}

impl Default for StateFormatter {
    fn default() -> Self {
        Self { max_slot_items: 5 }
    }
}

impl StateFormatter {
    pub fn format(
        &self,
        observation: &Observation,
        memory_highlights: &[String],
    ) -> FormattedState {
        let data = &observation.data;
        let recent_events = data
            .events
            .iter()
            .take(self.max_slot_items)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let summary = format!(
            "Tick {}: life={}, danger={}, resources={}, unknown={}.",
            observation.tick, data.life, data.danger, data.resources, data.unknown
        );
        let highlights = memory_highlights
            .iter()
            .take(self.max_slot_items)
            .cloned()
            .collect();
        FormattedState {
            summary,
            slots: StateSlots {
                tick: observation.tick,
                life: data.life,
                resources: data.resources,
                danger: data.danger,
                unknown: data.unknown,
                recent_events,
            },
            memory_highlights: highlights,
        }
    }
}
