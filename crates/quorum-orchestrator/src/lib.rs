//! Objective-level task orchestration: dependency-gated assignment over the
//! agent directory, failure and blocker handling with human escalation, and a
//! background monitor loop.

/// Blockers and their resolution paths.
pub mod blocker;
/// Dependency graph.
pub mod graph;
/// Monitor loop.
pub mod monitor;
/// The orchestrator itself.
pub mod orchestrator;
/// Task model and lifecycle.
pub mod task;

pub use blocker::{Blocker, BlockerKind};
pub use graph::TaskGraph;
pub use orchestrator::{ORCHESTRATOR_ID, ProgressSummary, SweepReport, TaskOrchestrator};
pub use task::{Task, TaskId, TaskStatus};
