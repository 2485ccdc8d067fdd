//! Task model and status lifecycle.

use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quorum_core::{Priority, TaskDescriptor, TaskType};

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, dependencies may still be pending.
    #[default]
    Planned,
    /// Handed to an agent, not yet started.
    Assigned,
    /// An agent is actively working on it.
    InProgress,
    /// Stuck; a blocker records why.
    Blocked,
    /// Work done, awaiting review.
    Review,
    /// Done.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl TaskStatus {
    /// Whether the lifecycle permits moving to `next`.
    ///
    /// `dependencies_complete` gates the `Planned -> Assigned` edge: a task
    /// whose dependencies are unfinished cannot be assigned no matter what
    /// the caller wants.
    #[must_use]
    pub fn can_transition_to(self, next: Self, dependencies_complete: bool) -> bool {
        match (self, next) {
            (Self::Planned, Self::Assigned) => dependencies_complete,
            (Self::Planned | Self::Assigned | Self::InProgress | Self::Blocked, Self::Cancelled)
            | (Self::Assigned, Self::InProgress | Self::Blocked)
            | (
                Self::InProgress,
                Self::Completed | Self::Blocked | Self::Review,
            )
            | (Self::Review, Self::Completed | Self::InProgress)
            | (Self::Blocked, Self::InProgress) => true,
            _ => false,
        }
    }

    /// Whether the task will never progress further.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One unit of work tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique id.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Longer description handed to the assigned agent.
    pub description: String,
    /// Kind of work.
    pub task_type: TaskType,
    /// Priority.
    pub priority: Priority,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Agent currently responsible, if any.
    pub assigned_to: Option<String>,
    /// Tasks that must complete first.
    pub dependencies: Vec<TaskId>,
    /// Rough effort estimate.
    pub estimated_effort_hours: f32,
    /// Complexity on the 1-10 scale.
    pub complexity: u8,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When work actually started.
    pub started_at: Option<DateTime<Utc>>,
    /// How many times the task has failed and been retried.
    pub retry_count: u32,
}

impl Task {
    /// Creates a planned task with medium priority and complexity 5.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: String::new(),
            task_type: TaskType::General,
            priority: Priority::Medium,
            status: TaskStatus::Planned,
            assigned_to: None,
            dependencies: Vec::new(),
            estimated_effort_hours: 1.0,
            complexity: 5,
            created_at: Utc::now(),
            started_at: None,
            retry_count: 0,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the task type.
    #[must_use]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the complexity, clamped to the 1-10 scale.
    #[must_use]
    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity.clamp(1, 10);
        self
    }

    /// Sets the effort estimate.
    #[must_use]
    pub fn with_estimated_effort_hours(mut self, hours: f32) -> Self {
        self.estimated_effort_hours = hours;
        self
    }

    /// View of this task as the routing layer sees it.
    #[must_use]
    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new(self.description.clone())
            .with_task_type(self.task_type)
            .with_complexity(self.complexity)
            .with_priority(self.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_gated_on_dependencies() {
        assert!(TaskStatus::Planned.can_transition_to(TaskStatus::Assigned, true));
        assert!(!TaskStatus::Planned.can_transition_to(TaskStatus::Assigned, false));
    }

    #[test]
    fn lifecycle_edges() {
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::InProgress, true));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Blocked, true));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Blocked, true));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::InProgress, true));
        assert!(TaskStatus::Review.can_transition_to(TaskStatus::Completed, true));
        assert!(TaskStatus::Review.can_transition_to(TaskStatus::InProgress, true));

        assert!(!TaskStatus::Planned.can_transition_to(TaskStatus::InProgress, true));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress, true));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Assigned, true));
    }

    #[test]
    fn builder_clamps_complexity() {
        let task = Task::new("redesign storage").with_complexity(12);
        assert_eq!(task.complexity, 10);
        assert_eq!(task.status, TaskStatus::Planned);
    }

    #[test]
    fn descriptor_reflects_task_fields() {
        let task = Task::new("add endpoint")
            .with_description("POST /v1/things")
            .with_task_type(TaskType::Backend)
            .with_complexity(4);
        let descriptor = task.descriptor();
        assert_eq!(descriptor.task_type, TaskType::Backend);
        assert_eq!(descriptor.complexity, 4);
        assert_eq!(descriptor.description, "POST /v1/things");
    }
}
