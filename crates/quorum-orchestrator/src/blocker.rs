//! Blockers: recorded reasons a task cannot progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskId;

/// Category of blocker, which determines the resolution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    /// Implementation problem; another agent may be able to help.
    Technical,
    /// Waiting on another task or external work item.
    Dependency,
    /// A human has to make a call.
    DecisionNeeded,
    /// Missing access, quota, or budget.
    Resource,
    /// Waiting on something outside the system.
    External,
}

impl BlockerKind {
    /// Whether this kind goes straight to a human instead of trying
    /// agent-to-agent assistance first.
    #[must_use]
    pub fn needs_immediate_escalation(self) -> bool {
        matches!(self, Self::DecisionNeeded)
    }
}

/// One recorded impediment on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    /// Unique id.
    pub id: Uuid,
    /// The task that is stuck.
    pub task_id: TaskId,
    /// Category.
    pub kind: BlockerKind,
    /// What is wrong.
    pub description: String,
    /// Whether a human has been pulled in.
    pub escalated_to_human: bool,
    /// How the blocker was (or is planned to be) cleared.
    pub resolution_strategy: Option<String>,
    /// When the blocker was raised.
    pub created_at: DateTime<Utc>,
}

impl Blocker {
    /// Raises a new blocker.
    #[must_use]
    pub fn new(task_id: TaskId, kind: BlockerKind, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            kind,
            description: description.into(),
            escalated_to_human: false,
            resolution_strategy: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_blockers_escalate_immediately() {
        assert!(BlockerKind::DecisionNeeded.needs_immediate_escalation());
        assert!(!BlockerKind::Technical.needs_immediate_escalation());
        assert!(!BlockerKind::Resource.needs_immediate_escalation());
    }

    #[test]
    fn new_blocker_starts_unescalated() {
        let blocker = Blocker::new(TaskId::new(), BlockerKind::Technical, "tests are flaky");
        assert!(!blocker.escalated_to_human);
        assert!(blocker.resolution_strategy.is_none());
    }
}
