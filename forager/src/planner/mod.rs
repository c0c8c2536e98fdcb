//! Planner collaborator seam and the two bundled implementations.

use crate::core::types::{
    ActionPlan, FormattedState, MemoryExport, Reflection, ResultSummary, RewardBreakdown,
};

pub mod delegate;
pub mod heuristic;
mod process;

pub use delegate::{CliDelegate, Delegate, DelegateError, DelegatedPlanner, PlanBundle};
pub use heuristic::HeuristicPlanner;

/// Produces a plan for each tick and a reflection after it.
///
/// Both methods are total from the loop's point of view: an implementation
/// that can fail internally (e.g. one that shells out) must degrade to a
/// deterministic fallback instead of returning an error.
pub trait Planner {
    fn plan(
        &mut self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> ActionPlan;

    fn reflect(&mut self, summary: &ResultSummary, reward: &RewardBreakdown) -> Reflection;
}

impl<P: Planner + ?Sized> Planner for Box<P> {
    fn plan(
        &mut self,
        state: &FormattedState,
        allowed_actions: &[String],
        memory: &MemoryExport,
    ) -> ActionPlan {
        (**self).plan(state, allowed_actions, memory)
    }

    fn reflect(&mut self, summary: &ResultSummary, reward: &RewardBreakdown) -> Reflection {
        (**self).reflect(summary, reward)
    }
}
