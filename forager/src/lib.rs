//! Survival-loop agent runtime with self-curating knowledge.
//!
//! The crate implements an observe → plan → act → reflect cycle over a
//! pluggable environment, plus an optional knowledge-curation pipeline that
//! distills each tick into durable playbook sections. The module split keeps
//! concerns separable:
//!
//! - **[`core`]**: per-tick records and pure logic (execution, reward,
//!   formatters). No filesystem state.
//! - **[`env`]**: the environment seam and the bundled grid world.
//! - **[`planner`]**: the planner seam, the deterministic heuristic, and the
//!   delegated CLI planner with its fallback.
//! - **[`ace`]**: reflect → curate → apply knowledge curation backed by the
//!   file-based playbook store.
//! - **[`looping`]**: the orchestrator tying all of the above together, one
//!   episode at a time.
//! - **[`memory`]**, **[`snapshots`]**, **[`report`]**: persistence for
//!   reflection notes, per-tick snapshots, and run aggregates.

pub mod ace;
pub mod config;
pub mod core;
pub mod env;
pub mod logging;
pub mod looping;
pub mod memory;
pub mod planner;
pub mod report;
pub mod snapshots;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
