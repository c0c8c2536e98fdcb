//! Reward synthesis: external environment reward plus an internal curiosity
//! bonus.

use std::collections::BTreeMap;

use crate::core::types::{Observation, RewardBreakdown};

/// Combines the environment's reward with a curiosity term.
///
/// The curiosity signal is computed by the caller as
/// `max(0, previous_unknown - current_unknown)`, so the bonus only pays out
/// when the unexplored fraction actually shrinks.
#[derive(Debug, Clone, Copy)]
pub struct RewardSynthesizer {
    pub curiosity_weight: f64,
}

impl Default for RewardSynthesizer {
    fn default() -> Self {
        Self {
            curiosity_weight: 0.2,
        }
    }
}

impl RewardSynthesizer {
    pub fn new(curiosity_weight: f64) -> Self {
        Self { curiosity_weight }
    }

    /// Pure: reads `observation.reward` verbatim as the external term.
    pub fn synthesize(&self, observation: &Observation, curiosity_signal: f64) -> RewardBreakdown {
        let external = observation.reward;
        let internal = curiosity_signal * self.curiosity_weight;
        let mut components = BTreeMap::new();
        components.insert("external".to_string(), external);
        components.insert("internal_curiosity".to_string(), internal);
        RewardBreakdown {
            external_reward: external,
            internal_reward: internal,
            components,
        }
    }
}
