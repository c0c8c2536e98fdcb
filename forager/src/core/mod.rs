//! Pure per-tick logic: shared records, plan execution, reward synthesis
//! and the planner-facing formatters.
//!
//! Core modules touch no filesystem state; the only side effects are the
//! environment calls the execution engine forwards.

pub mod execution;
pub mod result_format;
pub mod reward;
pub mod state_format;
pub mod types;
