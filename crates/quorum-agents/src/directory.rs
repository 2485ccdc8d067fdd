//! Live registry of agents and the scoring that picks one for a task.
//!
//! The directory tracks health, workload, and heartbeats. Scoring is a
//! weighted sum of inverse workload (0.3), agent-type/task-type compatibility
//! (0.5), and complexity fit against the type's sweet spot (0.2).

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quorum_core::{TaskDescriptor, TaskType};

/// Heartbeat age after which an agent is considered gone.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Specialist roles an agent can register as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Architecture and planning lead.
    Cto,
    /// Server-side specialist.
    Backend,
    /// Client-side specialist.
    Frontend,
    /// Testing specialist.
    Qa,
    /// Infrastructure specialist.
    Devops,
    /// Documentation specialist.
    Docs,
    /// No specialization; can take anything at reduced fit.
    Generalist,
}

impl Display for AgentType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Cto => "cto",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Qa => "qa",
            Self::Devops => "devops",
            Self::Docs => "docs",
            Self::Generalist => "generalist",
        };
        write!(formatter, "{name}")
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw {
            "cto" => Ok(Self::Cto),
            "backend" => Ok(Self::Backend),
            "frontend" => Ok(Self::Frontend),
            "qa" => Ok(Self::Qa),
            "devops" => Ok(Self::Devops),
            "docs" => Ok(Self::Docs),
            "generalist" => Ok(Self::Generalist),
            other => Err(format!("unknown agent type: {other}")),
        }
    }
}

impl AgentType {
    /// Compatibility of this agent type with a kind of work, in `[0, 1]`.
    #[must_use]
    pub fn compatibility(self, task_type: TaskType) -> f64 {
        match (self, task_type) {
            (Self::Cto, TaskType::SystemDesign)
            | (Self::Backend, TaskType::Backend)
            | (Self::Frontend, TaskType::Frontend)
            | (Self::Qa, TaskType::Testing)
            | (Self::Devops, TaskType::Deployment)
            | (Self::Docs, TaskType::Documentation) => 1.0,
            (Self::Cto, TaskType::Review) => 0.8,
            (Self::Backend | Self::Frontend, TaskType::Review) => 0.6,
            (Self::Backend | Self::Frontend, TaskType::Testing) => 0.5,
            (Self::Qa, TaskType::Review) => 0.7,
            (Self::Devops, TaskType::Backend) => 0.4,
            (Self::Generalist, _) => 0.3,
            (_, TaskType::General) => 0.5,
            _ => 0.1,
        }
    }

    /// Complexity range (1-10) this type is best suited for.
    #[must_use]
    pub fn complexity_sweet_spot(self) -> (u8, u8) {
        match self {
            Self::Cto => (7, 10),
            Self::Backend | Self::Frontend => (3, 8),
            Self::Qa => (2, 6),
            Self::Devops => (3, 7),
            Self::Docs => (1, 4),
            Self::Generalist => (1, 6),
        }
    }
}

/// Health report attached to a heartbeat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Whether the agent considers itself able to take work.
    pub is_healthy: bool,
    /// Self-reported health score in `[0, 1]`.
    pub health_score: f64,
}

impl AgentHealth {
    /// A healthy report with the given score, clamped to `[0, 1]`.
    #[must_use]
    pub fn healthy(health_score: f64) -> Self {
        Self {
            is_healthy: true,
            health_score: health_score.clamp(0.0, 1.0),
        }
    }

    /// An unhealthy report.
    #[must_use]
    pub fn unhealthy() -> Self {
        Self {
            is_healthy: false,
            health_score: 0.0,
        }
    }
}

impl Default for AgentHealth {
    fn default() -> Self {
        Self::healthy(1.0)
    }
}

/// One registered agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Specialist role.
    pub agent_type: AgentType,
    /// Kinds of work the agent advertises.
    pub capabilities: HashSet<TaskType>,
    /// Latest health report.
    pub health: AgentHealth,
    /// Tasks currently assigned.
    pub current_workload: usize,
    /// Assignment ceiling.
    pub max_workload: usize,
    /// Average time the agent takes to answer a message.
    pub avg_response_ms: u64,
    /// When the agent last checked in.
    pub last_heartbeat: Instant,
}

impl AgentRecord {
    /// Creates a record with default health, empty workload, and a fresh
    /// heartbeat.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            capabilities: HashSet::new(),
            health: AgentHealth::default(),
            current_workload: 0,
            max_workload: 3,
            avg_response_ms: 0,
            last_heartbeat: Instant::now(),
        }
    }

    /// Adds an advertised capability.
    #[must_use]
    pub fn with_capability(mut self, task_type: TaskType) -> Self {
        self.capabilities.insert(task_type);
        self
    }

    /// Sets the assignment ceiling.
    #[must_use]
    pub fn with_max_workload(mut self, max_workload: usize) -> Self {
        self.max_workload = max_workload;
        self
    }

    /// Sets the average response latency.
    #[must_use]
    pub fn with_avg_response_ms(mut self, avg_response_ms: u64) -> Self {
        self.avg_response_ms = avg_response_ms;
        self
    }

    /// Whether the agent can accept another task right now.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.current_workload < self.max_workload
    }

    /// Workload as a fraction of capacity.
    #[must_use]
    pub fn workload_ratio(&self) -> f64 {
        if self.max_workload == 0 {
            return 1.0;
        }
        self.current_workload as f64 / self.max_workload as f64
    }
}

/// In-process registry of agents with heartbeat-based liveness.
pub struct AgentDirectory {
    agents: HashMap<String, AgentRecord>,
    heartbeat_timeout: Duration,
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDirectory {
    /// Creates a directory with the default heartbeat timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }

    /// Overrides the heartbeat timeout.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, heartbeat_timeout: Duration) -> Self {
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    /// Registers an agent, replacing any previous record with the same id.
    pub fn register(&mut self, record: AgentRecord) {
        info!(agent_id = %record.agent_id, agent_type = %record.agent_type, "agent registered");
        self.agents.insert(record.agent_id.clone(), record);
    }

    /// Removes an agent, returning its final record.
    pub fn deregister(&mut self, agent_id: &str) -> Option<AgentRecord> {
        let removed = self.agents.remove(agent_id);
        if removed.is_some() {
            info!(agent_id, "agent deregistered");
        }
        removed
    }

    /// Records a heartbeat with a fresh health report.
    ///
    /// Unknown agents are ignored with a debug log; a restarting agent is
    /// expected to re-register.
    pub fn heartbeat(&mut self, agent_id: &str, health: AgentHealth) {
        if let Some(record) = self.agents.get_mut(agent_id) {
            record.health = health;
            record.last_heartbeat = Instant::now();
        } else {
            debug!(agent_id, "heartbeat from unknown agent ignored");
        }
    }

    /// Looks up an agent by id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.agents.get(agent_id)
    }

    /// Whether an agent is registered, healthy, and not stale.
    #[must_use]
    pub fn is_available(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .is_some_and(|record| self.is_live(record))
    }

    /// Agents of a given type, optionally restricted to live ones.
    #[must_use]
    pub fn find_by_type(&self, agent_type: AgentType, healthy_only: bool) -> Vec<&AgentRecord> {
        let mut matches: Vec<&AgentRecord> = self
            .agents
            .values()
            .filter(|record| record.agent_type == agent_type)
            .filter(|record| !healthy_only || self.is_live(record))
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        matches
    }

    /// Live agents advertising a capability.
    #[must_use]
    pub fn find_by_capability(&self, task_type: TaskType) -> Vec<&AgentRecord> {
        let mut matches: Vec<&AgentRecord> = self
            .agents
            .values()
            .filter(|record| record.capabilities.contains(&task_type))
            .filter(|record| self.is_live(record))
            .collect();
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        matches
    }

    /// Picks the best live agent for a task, excluding the given ids.
    ///
    /// Candidates must be live and have spare capacity. Ties are broken by
    /// lower workload, then lexical agent id, so repeated calls with the same
    /// state are deterministic.
    #[must_use]
    pub fn find_best_for_task(
        &self,
        task: &TaskDescriptor,
        exclude: &[&str],
    ) -> Option<&AgentRecord> {
        let mut best: Option<(f64, &AgentRecord)> = None;
        for record in self.agents.values() {
            if exclude.contains(&record.agent_id.as_str()) {
                continue;
            }
            if !self.is_live(record) || !record.has_capacity() {
                continue;
            }

            let score = Self::score(record, task);
            let replaces = match best {
                None => true,
                Some((best_score, best_record)) => {
                    score > best_score
                        || ((score - best_score).abs() < f64::EPSILON
                            && Self::tie_break(record, best_record))
                }
            };
            if replaces {
                best = Some((score, record));
            }
        }
        best.map(|(_, record)| record)
    }

    /// Increments an agent's workload after assignment.
    pub fn record_assignment(&mut self, agent_id: &str) {
        if let Some(record) = self.agents.get_mut(agent_id) {
            record.current_workload += 1;
        }
    }

    /// Decrements an agent's workload after completion.
    pub fn record_completion(&mut self, agent_id: &str) {
        if let Some(record) = self.agents.get_mut(agent_id) {
            record.current_workload = record.current_workload.saturating_sub(1);
        }
    }

    /// Removes agents whose heartbeat has lapsed, returning their ids.
    pub fn purge_stale(&mut self) -> Vec<String> {
        let timeout = self.heartbeat_timeout;
        let stale: Vec<String> = self
            .agents
            .values()
            .filter(|record| record.last_heartbeat.elapsed() > timeout)
            .map(|record| record.agent_id.clone())
            .collect();
        for agent_id in &stale {
            info!(agent_id, "purging stale agent");
            self.agents.remove(agent_id);
        }
        stale
    }

    /// All registered agents in id order.
    #[must_use]
    pub fn all(&self) -> Vec<&AgentRecord> {
        let mut records: Vec<&AgentRecord> = self.agents.values().collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        records
    }

    fn is_live(&self, record: &AgentRecord) -> bool {
        record.health.is_healthy && record.last_heartbeat.elapsed() <= self.heartbeat_timeout
    }

    fn score(record: &AgentRecord, task: &TaskDescriptor) -> f64 {
        let workload = (1.0 - record.workload_ratio()) * 0.3;
        let compatibility = record.agent_type.compatibility(task.task_type) * 0.5;
        let fit = Self::complexity_fit(record.agent_type, task.complexity) * 0.2;
        workload + compatibility + fit
    }

    fn complexity_fit(agent_type: AgentType, complexity: u8) -> f64 {
        let (low, high) = agent_type.complexity_sweet_spot();
        if (low..=high).contains(&complexity) {
            return 1.0;
        }
        let distance = if complexity < low {
            low - complexity
        } else {
            complexity - high
        };
        (1.0 - f64::from(distance) * 0.2).max(0.0)
    }

    fn tie_break(candidate: &AgentRecord, incumbent: &AgentRecord) -> bool {
        candidate
            .current_workload
            .cmp(&incumbent.current_workload)
            .then_with(|| candidate.agent_id.cmp(&incumbent.agent_id))
            .is_lt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_with(records: Vec<AgentRecord>) -> AgentDirectory {
        let mut directory = AgentDirectory::new();
        for record in records {
            directory.register(record);
        }
        directory
    }

    #[test]
    fn specialist_beats_generalist() {
        let directory = directory_with(vec![
            AgentRecord::new("gen-1", AgentType::Generalist),
            AgentRecord::new("backend-1", AgentType::Backend),
        ]);

        let task = TaskDescriptor::new("add API endpoint")
            .with_task_type(TaskType::Backend)
            .with_complexity(5);
        let best = directory.find_best_for_task(&task, &[]).unwrap();
        assert_eq!(best.agent_id, "backend-1");
    }

    #[test]
    fn lighter_workload_wins_between_equals() {
        let mut directory = directory_with(vec![
            AgentRecord::new("backend-1", AgentType::Backend),
            AgentRecord::new("backend-2", AgentType::Backend),
        ]);
        directory.record_assignment("backend-1");
        directory.record_assignment("backend-1");

        let task = TaskDescriptor::new("add API endpoint").with_task_type(TaskType::Backend);
        let best = directory.find_best_for_task(&task, &[]).unwrap();
        assert_eq!(best.agent_id, "backend-2");
    }

    #[test]
    fn exact_ties_break_lexically() {
        let directory = directory_with(vec![
            AgentRecord::new("backend-b", AgentType::Backend),
            AgentRecord::new("backend-a", AgentType::Backend),
        ]);

        let task = TaskDescriptor::new("add API endpoint").with_task_type(TaskType::Backend);
        let best = directory.find_best_for_task(&task, &[]).unwrap();
        assert_eq!(best.agent_id, "backend-a");
    }

    #[test]
    fn excluded_and_unhealthy_agents_are_skipped() {
        let mut directory = directory_with(vec![
            AgentRecord::new("backend-1", AgentType::Backend),
            AgentRecord::new("backend-2", AgentType::Backend),
            AgentRecord::new("gen-1", AgentType::Generalist),
        ]);
        directory.heartbeat("backend-2", AgentHealth::unhealthy());

        let task = TaskDescriptor::new("add API endpoint").with_task_type(TaskType::Backend);
        let best = directory.find_best_for_task(&task, &["backend-1"]).unwrap();
        assert_eq!(best.agent_id, "gen-1");
    }

    #[test]
    fn full_agents_are_not_assignable() {
        let mut directory =
            directory_with(vec![AgentRecord::new("backend-1", AgentType::Backend).with_max_workload(1)]);
        directory.record_assignment("backend-1");

        let task = TaskDescriptor::new("add API endpoint").with_task_type(TaskType::Backend);
        assert!(directory.find_best_for_task(&task, &[]).is_none());
    }

    #[test]
    fn stale_agents_are_purged_and_unavailable() {
        let mut directory = AgentDirectory::new().with_heartbeat_timeout(Duration::ZERO);
        let mut record = AgentRecord::new("backend-1", AgentType::Backend);
        record.last_heartbeat = Instant::now() - Duration::from_secs(1);
        directory.register(record);

        assert!(!directory.is_available("backend-1"));
        let purged = directory.purge_stale();
        assert_eq!(purged, vec!["backend-1".to_owned()]);
        assert!(directory.get("backend-1").is_none());
    }

    #[test]
    fn capability_lookup_filters_dead_agents() {
        let mut directory = directory_with(vec![
            AgentRecord::new("qa-1", AgentType::Qa).with_capability(TaskType::Testing),
            AgentRecord::new("qa-2", AgentType::Qa).with_capability(TaskType::Testing),
        ]);
        directory.heartbeat("qa-1", AgentHealth::unhealthy());

        let found = directory.find_by_capability(TaskType::Testing);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, "qa-2");
    }

    #[test]
    fn complexity_fit_decays_outside_sweet_spot() {
        assert!((AgentDirectory::complexity_fit(AgentType::Docs, 3) - 1.0).abs() < f64::EPSILON);
        assert!((AgentDirectory::complexity_fit(AgentType::Docs, 6) - 0.6).abs() < f64::EPSILON);
        assert!(AgentDirectory::complexity_fit(AgentType::Docs, 10).abs() < f64::EPSILON);
    }

    #[test]
    fn workload_counters_round_trip() {
        let mut directory = directory_with(vec![AgentRecord::new("backend-1", AgentType::Backend)]);
        directory.record_assignment("backend-1");
        assert_eq!(directory.get("backend-1").unwrap().current_workload, 1);

        directory.record_completion("backend-1");
        directory.record_completion("backend-1");
        assert_eq!(directory.get("backend-1").unwrap().current_workload, 0);
    }
}
