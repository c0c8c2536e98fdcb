//! Environment collaborator seam.
//!
//! The loop only ever talks to an environment through this trait; the bundled
//! [`GridWorld`] is one implementation, scripted doubles in `test_support`
//! are another.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::types::Observation;

pub mod gridworld;

pub use gridworld::{GridWorld, GridWorldConfig};

/// A simulated world the agent acts in.
///
/// Both `reset` and `step` are total: an environment reports bad input
/// through the observation (events, penalties), never through an error.
pub trait Environment {
    /// Start a fresh episode and return the initial observation.
    fn reset(&mut self) -> Observation;

    /// Advance the world by one action.
    fn step(&mut self, action_id: &str, parameters: &BTreeMap<String, Value>) -> Observation;

    /// The fixed action vocabulary; doubles as the engine's whitelist.
    fn action_schema(&self) -> &[String];
}
