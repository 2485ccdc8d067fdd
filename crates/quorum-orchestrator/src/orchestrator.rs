//! The task orchestrator: objective intake, dependency-gated assignment,
//! completion/failure handling, and blocker escalation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use quorum_agents::{
    AgentDirectory, AgentHealth, AgentMessage, AgentRecord, MessageBus, MessageRouter, MessageType,
};
use quorum_core::{Error, OrchestratorConfig, Result};

use crate::blocker::{Blocker, BlockerKind};
use crate::graph::TaskGraph;
use crate::task::{Task, TaskId, TaskStatus};

/// Sender id the orchestrator uses on the bus.
pub const ORCHESTRATOR_ID: &str = "orchestrator";

struct OrchestratorState {
    objective: Option<String>,
    tasks: HashMap<TaskId, Task>,
    graph: Option<TaskGraph>,
    completed: HashSet<TaskId>,
    blockers: HashMap<Uuid, Blocker>,
    directory: AgentDirectory,
    human_collaborators: Vec<String>,
}

/// Counts reported by [`TaskOrchestrator::progress_summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// The objective being worked, if one was submitted.
    pub objective: Option<String>,
    /// Total tasks in the decomposition.
    pub total_tasks: usize,
    /// Tasks not yet assigned.
    pub planned: usize,
    /// Tasks handed to an agent.
    pub assigned: usize,
    /// Tasks being worked.
    pub in_progress: usize,
    /// Stuck tasks.
    pub blocked: usize,
    /// Tasks awaiting review.
    pub review: usize,
    /// Finished tasks.
    pub completed: usize,
    /// Abandoned tasks.
    pub cancelled: usize,
    /// Blockers not yet resolved.
    pub open_blockers: usize,
    /// Whether every task has completed.
    pub is_complete: bool,
}

/// What one monitor sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Tasks that got a progress check for stalling.
    pub progress_checks: Vec<TaskId>,
    /// Stalled tasks blocked because no live assignee could be checked.
    pub timed_out: Vec<TaskId>,
    /// Blockers auto-created for blocked tasks that had none.
    pub auto_blockers: usize,
    /// Agents purged for missed heartbeats.
    pub purged_agents: Vec<String>,
}

/// Coordinates an objective's tasks across the registered agents.
#[derive(Clone)]
pub struct TaskOrchestrator {
    state: Arc<Mutex<OrchestratorState>>,
    bus: Arc<dyn MessageBus>,
    message_router: MessageRouter,
    pub(crate) config: OrchestratorConfig,
}

impl TaskOrchestrator {
    /// Creates an orchestrator publishing on the given bus.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, config: OrchestratorConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(OrchestratorState {
                objective: None,
                tasks: HashMap::new(),
                graph: None,
                completed: HashSet::new(),
                blockers: HashMap::new(),
                directory: AgentDirectory::new(),
                human_collaborators: Vec::new(),
            })),
            bus,
            message_router: MessageRouter::new(),
            config,
        }
    }

    /// Overrides the message router.
    #[must_use]
    pub fn with_message_router(mut self, message_router: MessageRouter) -> Self {
        self.message_router = message_router;
        self
    }

    /// Registers an agent in the directory.
    pub async fn register_agent(&self, record: AgentRecord) {
        self.state.lock().await.directory.register(record);
    }

    /// Removes an agent from the directory.
    pub async fn deregister_agent(&self, agent_id: &str) {
        self.state.lock().await.directory.deregister(agent_id);
    }

    /// Records an agent heartbeat.
    pub async fn heartbeat(&self, agent_id: &str, health: AgentHealth) {
        self.state.lock().await.directory.heartbeat(agent_id, health);
    }

    /// Registers a human who can receive escalations.
    pub async fn register_human_collaborator(&self, collaborator_id: impl Into<String>) {
        let collaborator_id = collaborator_id.into();
        info!(collaborator_id, "human collaborator registered");
        self.state
            .lock()
            .await
            .human_collaborators
            .push(collaborator_id);
    }

    /// Accepts an objective and its task decomposition.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an empty decomposition, a dependency on
    /// an unknown task, or a dependency cycle.
    pub async fn submit_objective(&self, objective: impl Into<String>, tasks: Vec<Task>) -> Result<()> {
        if tasks.is_empty() {
            return Err(Error::Config("objective decomposition is empty".to_owned()));
        }

        let known: HashSet<TaskId> = tasks.iter().map(|task| task.id).collect();
        for task in &tasks {
            for dependency in &task.dependencies {
                if !known.contains(dependency) {
                    return Err(Error::Config(format!(
                        "task '{}' depends on unknown task {dependency}",
                        task.title
                    )));
                }
            }
        }

        let graph = TaskGraph::from_tasks(&tasks);
        if graph.has_cycles() {
            return Err(Error::Config(
                "task decomposition contains a dependency cycle".to_owned(),
            ));
        }

        let objective = objective.into();
        info!(objective, task_count = tasks.len(), "objective accepted");

        let mut state = self.state.lock().await;
        state.objective = Some(objective);
        state.tasks = tasks.into_iter().map(|task| (task.id, task)).collect();
        state.graph = Some(graph);
        state.completed.clear();
        state.blockers.clear();
        Ok(())
    }

    /// Assigns every dependency-free planned task to the best available
    /// agent, publishing a `TaskAssignment` for each.
    ///
    /// Tasks with no suitable agent stay planned and are retried on the next
    /// call. Returns the `(task, agent)` pairs that were assigned.
    pub async fn assign_ready_tasks(&self) -> Vec<(TaskId, String)> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(graph) = state.graph.as_ref() else {
            return Vec::new();
        };

        let mut assignments = Vec::new();
        for task_id in graph.ready_tasks(&state.completed) {
            let Some(task) = state.tasks.get_mut(&task_id) else {
                continue;
            };
            if task.status != TaskStatus::Planned {
                continue;
            }

            let Some(agent_id) = state
                .directory
                .find_best_for_task(&task.descriptor(), &[])
                .map(|record| record.agent_id.clone())
            else {
                debug!(%task_id, title = %task.title, "no agent available; leaving planned");
                continue;
            };

            task.status = TaskStatus::Assigned;
            task.assigned_to = Some(agent_id.clone());
            state.directory.record_assignment(&agent_id);
            info!(%task_id, agent_id, title = %task.title, "task assigned");

            let message = AgentMessage::new(ORCHESTRATOR_ID, MessageType::TaskAssignment)
                .with_recipient(&agent_id)
                .with_priority(task.priority)
                .with_payload(json!({
                    "task_id": task_id,
                    "title": task.title,
                    "description": task.description,
                    "task_type": task.task_type,
                    "complexity": task.complexity,
                }));
            self.deliver(&message, &state.directory).await;

            assignments.push((task_id, agent_id));
        }
        assignments
    }

    /// Moves an assigned task into progress, timestamping the start.
    ///
    /// # Errors
    /// Returns [`Error::Other`] for an unknown task or an invalid transition.
    pub async fn mark_started(&self, task_id: TaskId) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::Other(format!("unknown task {task_id}")))?;
        if !task
            .status
            .can_transition_to(TaskStatus::InProgress, true)
        {
            return Err(Error::Other(format!(
                "task {task_id} cannot start from {:?}",
                task.status
            )));
        }
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        Ok(())
    }

    /// Marks a task completed, frees the agent, and assigns any newly
    /// unlocked dependents.
    ///
    /// # Errors
    /// Returns [`Error::Other`] for an unknown task or a task that is not in
    /// a completable state.
    pub async fn handle_completion(&self, task_id: TaskId) -> Result<Vec<(TaskId, String)>> {
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let task = state
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| Error::Other(format!("unknown task {task_id}")))?;
            if !matches!(
                task.status,
                TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::Review
            ) {
                return Err(Error::Other(format!(
                    "task {task_id} cannot complete from {:?}",
                    task.status
                )));
            }

            task.status = TaskStatus::Completed;
            state.completed.insert(task_id);
            if let Some(agent_id) = task.assigned_to.clone() {
                state.directory.record_completion(&agent_id);
            }
            state.blockers.retain(|_, blocker| blocker.task_id != task_id);
            info!(%task_id, "task completed");
        }

        Ok(self.assign_ready_tasks().await)
    }

    /// Handles a reported task failure.
    ///
    /// The task is blocked with a technical blocker. Up to
    /// `max_task_retries_before_escalation` failures, another agent is asked
    /// to assist; past that, the blocker escalates to a human.
    ///
    /// # Errors
    /// Returns [`Error::Other`] for an unknown task or a stale report against
    /// a task that can no longer be blocked.
    pub async fn handle_failure(&self, task_id: TaskId, reason: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::Other(format!("unknown task {task_id}")))?;
        if task.status != TaskStatus::Blocked
            && !task.status.can_transition_to(TaskStatus::Blocked, true)
        {
            return Err(Error::Other(format!(
                "task {task_id} cannot fail from {:?}",
                task.status
            )));
        }

        task.retry_count += 1;
        task.status = TaskStatus::Blocked;
        let failed_agent = task.assigned_to.clone();
        let descriptor = task.descriptor();
        let retry_count = task.retry_count;
        warn!(%task_id, retry_count, reason, "task failed");

        if let Some(agent_id) = failed_agent.as_deref() {
            state.directory.record_completion(agent_id);
        }

        let mut blocker = Blocker::new(task_id, BlockerKind::Technical, reason);

        if retry_count > self.config.max_task_retries_before_escalation {
            self.escalate_locked(state, &mut blocker).await;
            state.blockers.insert(blocker.id, blocker);
            return Ok(());
        }

        // Try to find a peer who can help before bothering a human.
        let exclude: Vec<&str> = failed_agent.iter().map(String::as_str).collect();
        let helper = state
            .directory
            .find_best_for_task(&descriptor, &exclude)
            .map(|record| record.agent_id.clone());
        match helper {
            Some(helper_id) => {
                let message = AgentMessage::new(ORCHESTRATOR_ID, MessageType::AssistanceOffer)
                    .with_recipient(&helper_id)
                    .with_payload(json!({
                        "task_id": task_id,
                        "blocker_id": blocker.id,
                        "reason": reason,
                    }));
                self.deliver(&message, &state.directory).await;
                blocker.resolution_strategy = Some(format!("assistance requested from {helper_id}"));
            }
            None => {
                self.escalate_locked(state, &mut blocker).await;
            }
        }
        state.blockers.insert(blocker.id, blocker);
        Ok(())
    }

    /// Records a blocker raised by an agent and starts its resolution path.
    ///
    /// # Errors
    /// Returns [`Error::Other`] when the blocker references an unknown task.
    pub async fn report_blocker(&self, mut blocker: Blocker) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let task = state
            .tasks
            .get_mut(&blocker.task_id)
            .ok_or_else(|| Error::Other(format!("unknown task {}", blocker.task_id)))?;
        if task.status.can_transition_to(TaskStatus::Blocked, true) {
            task.status = TaskStatus::Blocked;
        }
        let descriptor = task.descriptor();
        let owner = task.assigned_to.clone();

        if blocker.kind == BlockerKind::Technical {
            let exclude: Vec<&str> = owner.iter().map(String::as_str).collect();
            if let Some(helper) = state
                .directory
                .find_best_for_task(&descriptor, &exclude)
                .map(|record| record.agent_id.clone())
            {
                let message = AgentMessage::new(ORCHESTRATOR_ID, MessageType::AssistanceOffer)
                    .with_recipient(&helper)
                    .with_payload(json!({
                        "task_id": blocker.task_id,
                        "blocker_id": blocker.id,
                        "reason": blocker.description,
                    }));
                self.deliver(&message, &state.directory).await;
                blocker.resolution_strategy = Some(format!("assistance requested from {helper}"));
                state.blockers.insert(blocker.id, blocker);
                return Ok(());
            }
        }

        // DecisionNeeded, resource/dependency/external blockers, and
        // technical blockers with nobody to help all go to a human.
        self.escalate_locked(state, &mut blocker).await;
        state.blockers.insert(blocker.id, blocker);
        Ok(())
    }

    /// Clears a blocker and unblocks its task if nothing else holds it.
    ///
    /// # Errors
    /// Returns [`Error::Other`] for an unknown blocker id.
    pub async fn resolve_blocker(&self, blocker_id: Uuid, resolution: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let blocker = state
            .blockers
            .remove(&blocker_id)
            .ok_or_else(|| Error::Other(format!("unknown blocker {blocker_id}")))?;
        info!(%blocker_id, task_id = %blocker.task_id, resolution, "blocker resolved");

        let still_blocked = state
            .blockers
            .values()
            .any(|other| other.task_id == blocker.task_id);
        if !still_blocked {
            if let Some(task) = state.tasks.get_mut(&blocker.task_id) {
                if task.status == TaskStatus::Blocked {
                    task.status = TaskStatus::InProgress;
                }
            }
        }
        Ok(())
    }

    /// Escalates an existing blocker to a human collaborator.
    ///
    /// # Errors
    /// Returns [`Error::Other`] for an unknown blocker id.
    pub async fn escalate(&self, blocker_id: Uuid) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut blocker = state
            .blockers
            .remove(&blocker_id)
            .ok_or_else(|| Error::Other(format!("unknown blocker {blocker_id}")))?;
        self.escalate_locked(state, &mut blocker).await;
        state.blockers.insert(blocker.id, blocker);
        Ok(())
    }

    /// Point-in-time progress counts.
    pub async fn progress_summary(&self) -> ProgressSummary {
        let state = self.state.lock().await;
        let mut summary = ProgressSummary {
            objective: state.objective.clone(),
            total_tasks: state.tasks.len(),
            planned: 0,
            assigned: 0,
            in_progress: 0,
            blocked: 0,
            review: 0,
            completed: 0,
            cancelled: 0,
            open_blockers: state.blockers.len(),
            is_complete: false,
        };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Planned => summary.planned += 1,
                TaskStatus::Assigned => summary.assigned += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Blocked => summary.blocked += 1,
                TaskStatus::Review => summary.review += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary.is_complete = state
            .graph
            .as_ref()
            .is_some_and(|graph| graph.is_complete(&state.completed));
        summary
    }

    /// One monitoring pass: progress-check stalled tasks (blocking those with
    /// no reachable assignee), record blockers for blocked tasks that have
    /// none, and purge stale agents.
    ///
    /// Takes an explicit `now` so sweeps are testable without waiting.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut report = SweepReport::default();
        let stall_threshold = ChronoDuration::seconds(self.config.stall_threshold_secs as i64);

        let stalled: Vec<(TaskId, Option<String>)> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::InProgress)
            .filter(|task| {
                task.started_at
                    .is_some_and(|started| now - started > stall_threshold)
            })
            .map(|task| (task.id, task.assigned_to.clone()))
            .collect();
        for (task_id, assigned_to) in stalled {
            match assigned_to {
                Some(agent_id) if state.directory.get(&agent_id).is_some() => {
                    debug!(%task_id, agent_id, "task stalled; sending progress check");
                    let message = AgentMessage::new(ORCHESTRATOR_ID, MessageType::ProgressCheck)
                        .with_recipient(&agent_id)
                        .with_payload(json!({ "task_id": task_id }));
                    self.deliver(&message, &state.directory).await;
                    report.progress_checks.push(task_id);
                }
                _ => {
                    // Nobody left to progress-check; convert the timeout into
                    // a blocker instead of failing the sweep.
                    let error = Error::TaskTimeout(format!(
                        "task {task_id} exceeded {}s in progress with no reachable assignee",
                        self.config.stall_threshold_secs
                    ));
                    warn!(%task_id, %error, "stalled task blocked");
                    if let Some(task) = state.tasks.get_mut(&task_id) {
                        task.status = TaskStatus::Blocked;
                    }
                    let blocker =
                        Blocker::new(task_id, BlockerKind::Technical, error.to_string());
                    state.blockers.insert(blocker.id, blocker);
                    report.timed_out.push(task_id);
                }
            }
        }

        let orphaned: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|task| task.status == TaskStatus::Blocked)
            .filter(|task| {
                !state
                    .blockers
                    .values()
                    .any(|blocker| blocker.task_id == task.id)
            })
            .map(|task| task.id)
            .collect();
        for task_id in orphaned {
            warn!(%task_id, "blocked task has no blocker on record; creating one");
            let blocker = Blocker::new(
                task_id,
                BlockerKind::Technical,
                "task is blocked with no recorded blocker",
            );
            state.blockers.insert(blocker.id, blocker);
            report.auto_blockers += 1;
        }

        report.purged_agents = state.directory.purge_stale();
        report
    }

    /// Resolves and publishes a message, logging delivery problems instead
    /// of failing the surrounding operation.
    async fn deliver(&self, message: &AgentMessage, directory: &AgentDirectory) {
        let decision = self.message_router.resolve(message, directory);
        if !decision.success {
            warn!(reason = %decision.reason, "message has no viable delivery target");
            return;
        }
        let routed = message.clone().with_routing_key(decision.routing_key);
        if let Err(error) = self.bus.publish(&routed).await {
            warn!(%error, "failed to publish message");
        }
    }

    async fn escalate_locked(&self, state: &mut OrchestratorState, blocker: &mut Blocker) {
        blocker.escalated_to_human = true;
        let Some(human) = state.human_collaborators.first().cloned() else {
            warn!(blocker_id = %blocker.id, "no human collaborator registered; escalation is queued");
            return;
        };

        info!(blocker_id = %blocker.id, human, "escalating blocker to human");
        let message = AgentMessage::new(ORCHESTRATOR_ID, MessageType::Escalation)
            .with_recipient(&human)
            .with_routing_key(format!("agent.{human}"))
            .with_priority(quorum_core::Priority::High)
            .with_payload(json!({
                "blocker_id": blocker.id,
                "task_id": blocker.task_id,
                "kind": blocker.kind,
                "description": blocker.description,
            }));
        // Humans are not in the directory; publish straight to their queue.
        if let Err(error) = self.bus.publish(&message).await {
            warn!(%error, "failed to publish escalation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_agents::{AgentType, InMemoryBus, agent_queue};
    use quorum_core::TaskType;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn bind_agent(bus: &InMemoryBus, agent_id: &str) -> UnboundedReceiver<AgentMessage> {
        let queue = agent_queue(agent_id);
        let receiver = bus.declare_queue(&queue).await;
        bus.register_handler(agent_id, vec![format!("agent.{agent_id}")], &queue)
            .await
            .unwrap();
        receiver
    }

    fn orchestrator_on(bus: Arc<InMemoryBus>, config: OrchestratorConfig) -> TaskOrchestrator {
        TaskOrchestrator::new(bus, config)
    }

    #[tokio::test]
    async fn cyclic_decomposition_is_rejected() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );

        let mut first = Task::new("first");
        let second = Task::new("second").with_dependencies(vec![first.id]);
        first.dependencies = vec![second.id];

        let result = orchestrator.submit_objective("impossible", vec![first, second]).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );

        let task = Task::new("floating").with_dependencies(vec![TaskId::new()]);
        let result = orchestrator.submit_objective("broken", vec![task]).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn assignment_waits_for_dependencies() {
        let bus = Arc::new(InMemoryBus::new());
        let mut backend_queue = bind_agent(&bus, "backend-1").await;
        let orchestrator = orchestrator_on(Arc::clone(&bus), OrchestratorConfig::default());
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;

        let schema = Task::new("design schema").with_task_type(TaskType::Backend);
        let api = Task::new("build API")
            .with_task_type(TaskType::Backend)
            .with_dependencies(vec![schema.id]);
        orchestrator
            .submit_objective("ship the API", vec![schema.clone(), api.clone()])
            .await
            .unwrap();

        let assigned = orchestrator.assign_ready_tasks().await;
        assert_eq!(assigned, vec![(schema.id, "backend-1".to_owned())]);

        let delivered = backend_queue.try_recv().unwrap();
        assert_eq!(delivered.message_type, MessageType::TaskAssignment);
        assert_eq!(delivered.payload["title"], "design schema");

        // The dependent stays planned until its dependency completes.
        assert!(orchestrator.assign_ready_tasks().await.is_empty());

        let unlocked = orchestrator.handle_completion(schema.id).await.unwrap();
        assert_eq!(unlocked, vec![(api.id, "backend-1".to_owned())]);
        let delivered = backend_queue.try_recv().unwrap();
        assert_eq!(delivered.payload["title"], "build API");
    }

    #[tokio::test]
    async fn unassignable_tasks_stay_planned() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );
        orchestrator
            .submit_objective("no workforce", vec![Task::new("lonely task")])
            .await
            .unwrap();

        assert!(orchestrator.assign_ready_tasks().await.is_empty());
        let summary = orchestrator.progress_summary().await;
        assert_eq!(summary.planned, 1);
    }

    #[tokio::test]
    async fn failure_requests_assistance_then_escalates() {
        let bus = Arc::new(InMemoryBus::new());
        let _backend1_queue = bind_agent(&bus, "backend-1").await;
        let mut backend2_queue = bind_agent(&bus, "backend-2").await;
        let mut human_queue = bind_agent(&bus, "pm-1").await;

        let config = OrchestratorConfig {
            max_task_retries_before_escalation: 1,
            ..OrchestratorConfig::default()
        };
        let orchestrator = orchestrator_on(Arc::clone(&bus), config);
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;
        orchestrator
            .register_agent(AgentRecord::new("backend-2", AgentType::Backend))
            .await;
        orchestrator.register_human_collaborator("pm-1").await;

        let task = Task::new("flaky migration").with_task_type(TaskType::Backend);
        let task_id = task.id;
        orchestrator.submit_objective("migrate", vec![task]).await.unwrap();
        let assigned = orchestrator.assign_ready_tasks().await;
        assert_eq!(assigned[0].1, "backend-1");

        // First failure asks a peer for help.
        orchestrator.handle_failure(task_id, "migration timed out").await.unwrap();
        let assistance = backend2_queue.try_recv().unwrap();
        assert_eq!(assistance.message_type, MessageType::AssistanceOffer);
        assert!(human_queue.try_recv().is_err());

        // Second failure crosses the retry budget and goes to the human.
        orchestrator.handle_failure(task_id, "still timing out").await.unwrap();
        let escalation = human_queue.try_recv().unwrap();
        assert_eq!(escalation.message_type, MessageType::Escalation);
    }

    #[tokio::test]
    async fn decision_blockers_escalate_immediately() {
        let bus = Arc::new(InMemoryBus::new());
        let mut human_queue = bind_agent(&bus, "pm-1").await;
        let orchestrator = orchestrator_on(Arc::clone(&bus), OrchestratorConfig::default());
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;
        orchestrator.register_human_collaborator("pm-1").await;

        let task = Task::new("choose a database");
        let task_id = task.id;
        orchestrator.submit_objective("storage", vec![task]).await.unwrap();
        orchestrator.assign_ready_tasks().await;
        orchestrator.mark_started(task_id).await.unwrap();

        let blocker = Blocker::new(task_id, BlockerKind::DecisionNeeded, "postgres or sqlite?");
        orchestrator.report_blocker(blocker).await.unwrap();

        let escalation = human_queue.try_recv().unwrap();
        assert_eq!(escalation.message_type, MessageType::Escalation);
        assert_eq!(orchestrator.progress_summary().await.blocked, 1);
    }

    #[tokio::test]
    async fn resolving_the_last_blocker_unblocks_the_task() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;

        let task = Task::new("integrate payments");
        let task_id = task.id;
        orchestrator.submit_objective("payments", vec![task]).await.unwrap();
        orchestrator.assign_ready_tasks().await;
        orchestrator.mark_started(task_id).await.unwrap();

        let blocker = Blocker::new(task_id, BlockerKind::External, "waiting on API credentials");
        let blocker_id = blocker.id;
        orchestrator.report_blocker(blocker).await.unwrap();
        assert_eq!(orchestrator.progress_summary().await.blocked, 1);

        orchestrator
            .resolve_blocker(blocker_id, "credentials arrived")
            .await
            .unwrap();
        let summary = orchestrator.progress_summary().await;
        assert_eq!(summary.blocked, 0);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.open_blockers, 0);
    }

    #[tokio::test]
    async fn sweep_checks_stalled_tasks_and_backfills_blockers() {
        let bus = Arc::new(InMemoryBus::new());
        let mut backend_queue = bind_agent(&bus, "backend-1").await;
        let orchestrator = orchestrator_on(Arc::clone(&bus), OrchestratorConfig::default());
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;

        let stalled = Task::new("long refactor");
        let orphaned = Task::new("stuck task");
        let stalled_id = stalled.id;
        let orphaned_id = orphaned.id;
        orchestrator
            .submit_objective("cleanup", vec![stalled, orphaned])
            .await
            .unwrap();
        orchestrator.assign_ready_tasks().await;
        let _ = backend_queue.try_recv();
        let _ = backend_queue.try_recv();
        orchestrator.mark_started(stalled_id).await.unwrap();
        orchestrator.mark_started(orphaned_id).await.unwrap();
        orchestrator
            .update_status_for_test(orphaned_id, TaskStatus::Blocked)
            .await;

        let later = Utc::now() + ChronoDuration::hours(2);
        let report = orchestrator.run_sweep(later).await;

        assert_eq!(report.progress_checks, vec![stalled_id]);
        assert_eq!(report.auto_blockers, 1);
        let check = backend_queue.try_recv().unwrap();
        assert_eq!(check.message_type, MessageType::ProgressCheck);

        // Second sweep does not duplicate the auto-created blocker.
        let report = orchestrator.run_sweep(later).await;
        assert_eq!(report.auto_blockers, 0);
    }

    #[tokio::test]
    async fn sweep_blocks_stalled_tasks_with_no_live_assignee() {
        let bus = Arc::new(InMemoryBus::new());
        let _backend_queue = bind_agent(&bus, "backend-1").await;
        let orchestrator = orchestrator_on(Arc::clone(&bus), OrchestratorConfig::default());
        orchestrator
            .register_agent(AgentRecord::new("backend-1", AgentType::Backend))
            .await;

        let task = Task::new("abandoned deploy");
        let task_id = task.id;
        orchestrator.submit_objective("deploy", vec![task]).await.unwrap();
        orchestrator.assign_ready_tasks().await;
        orchestrator.mark_started(task_id).await.unwrap();
        orchestrator.deregister_agent("backend-1").await;

        let later = Utc::now() + ChronoDuration::hours(2);
        let report = orchestrator.run_sweep(later).await;

        assert_eq!(report.timed_out, vec![task_id]);
        assert!(report.progress_checks.is_empty());
        let summary = orchestrator.progress_summary().await;
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.open_blockers, 1);

        // A second sweep neither re-blocks nor duplicates the blocker.
        let report = orchestrator.run_sweep(later).await;
        assert!(report.timed_out.is_empty());
        assert_eq!(report.auto_blockers, 0);
    }

    #[tokio::test]
    async fn stale_failure_reports_cannot_regress_a_completed_task() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );
        orchestrator
            .register_agent(AgentRecord::new("gen-1", AgentType::Generalist))
            .await;

        let task = Task::new("ship it");
        let task_id = task.id;
        orchestrator.submit_objective("release", vec![task]).await.unwrap();
        orchestrator.assign_ready_tasks().await;
        orchestrator.handle_completion(task_id).await.unwrap();

        let result = orchestrator
            .handle_failure(task_id, "late duplicate report")
            .await;
        assert!(matches!(result, Err(Error::Other(_))));

        let summary = orchestrator.progress_summary().await;
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.blocked, 0);
        assert_eq!(summary.open_blockers, 0);
    }

    #[tokio::test]
    async fn completion_report_reflects_the_whole_objective() {
        let orchestrator = orchestrator_on(
            Arc::new(InMemoryBus::new()),
            OrchestratorConfig::default(),
        );
        orchestrator
            .register_agent(AgentRecord::new("gen-1", AgentType::Generalist))
            .await;

        let first = Task::new("step one");
        let second = Task::new("step two").with_dependencies(vec![first.id]);
        let (first_id, second_id) = (first.id, second.id);
        orchestrator
            .submit_objective("two steps", vec![first, second])
            .await
            .unwrap();

        orchestrator.assign_ready_tasks().await;
        orchestrator.handle_completion(first_id).await.unwrap();
        assert!(!orchestrator.progress_summary().await.is_complete);

        orchestrator.handle_completion(second_id).await.unwrap();
        let summary = orchestrator.progress_summary().await;
        assert!(summary.is_complete);
        assert_eq!(summary.completed, 2);
    }

    impl TaskOrchestrator {
        /// Test-only direct status poke, bypassing transition guards.
        async fn update_status_for_test(&self, task_id: TaskId, status: TaskStatus) {
            let mut state = self.state.lock().await;
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.status = status;
            }
        }
    }
}
