//! Message envelope and bus abstraction.
//!
//! The broker itself is external; [`MessageBus`] is the seam, and
//! [`InMemoryBus`] is a topic-matching implementation over tokio channels
//! used by tests and the orchestrator's default wiring.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use quorum_core::{Error, Priority, Result};

/// What a message is for. Determines default routing and how the receiving
/// agent reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Hand a task to whichever agent fits best.
    TaskDelegation,
    /// Assign a task to a specific agent.
    TaskAssignment,
    /// Progress report from an agent.
    StatusUpdate,
    /// A task finished successfully.
    TaskCompleted,
    /// A task failed.
    TaskFailed,
    /// Offer of help on a blocked task.
    AssistanceOffer,
    /// Orchestrator asking an agent how a task is going.
    ProgressCheck,
    /// A problem needs a human.
    Escalation,
    /// Fan-out to every agent.
    Broadcast,
}

impl MessageType {
    /// Routing key used when the sender does not set one explicitly.
    #[must_use]
    pub fn default_routing_key(self) -> &'static str {
        match self {
            Self::TaskDelegation => "agent.task.delegation",
            Self::TaskAssignment => "agent.task.assignment",
            Self::StatusUpdate => "agent.status.update",
            Self::TaskCompleted => "agent.task.completed",
            Self::TaskFailed => "agent.task.failed",
            Self::AssistanceOffer => "agent.assistance.offer",
            Self::ProgressCheck => "agent.progress.check",
            Self::Escalation => "agent.escalation",
            Self::Broadcast => "agent.broadcast",
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        write!(formatter, "{}", self.default_routing_key())
    }
}

/// One message between agents (or between the orchestrator and an agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Sending agent.
    pub sender_id: String,
    /// Target agent, when addressed directly.
    pub recipient_id: Option<String>,
    /// Purpose of the message.
    pub message_type: MessageType,
    /// Topic key the bus routes on.
    pub routing_key: String,
    /// Free-form payload.
    pub payload: Value,
    /// Delivery priority.
    pub priority: Priority,
}

impl AgentMessage {
    /// Creates a message with the type's default routing key and an empty
    /// payload.
    #[must_use]
    pub fn new(sender_id: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: None,
            message_type,
            routing_key: message_type.default_routing_key().to_owned(),
            payload: Value::Null,
            priority: Priority::Medium,
        }
    }

    /// Addresses the message to a specific agent.
    #[must_use]
    pub fn with_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    /// Overrides the routing key.
    #[must_use]
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Transport seam between agents.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message to every queue bound to its routing key.
    ///
    /// # Errors
    /// Returns [`Error::AgentCommunication`] when the transport rejects the
    /// message. A key with no bound queue is not an error.
    async fn publish(&self, message: &AgentMessage) -> Result<()>;

    /// Binds a queue to a set of routing-key patterns on behalf of an agent.
    ///
    /// # Errors
    /// Returns [`Error::AgentCommunication`] when the binding cannot be
    /// created.
    async fn register_handler(
        &self,
        agent_id: &str,
        routing_keys: Vec<String>,
        queue_name: &str,
    ) -> Result<()>;
}

/// Whether a topic pattern matches a concrete routing key.
///
/// Patterns use dotted segments with `*` matching exactly one segment and `#`
/// matching the rest of the key.
#[must_use]
pub fn key_matches(pattern: &str, key: &str) -> bool {
    let mut pattern_segments = pattern.split('.');
    let mut key_segments = key.split('.');

    loop {
        match (pattern_segments.next(), key_segments.next()) {
            (Some("#"), _) => return true,
            (Some("*"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct BusState {
    queues: HashMap<String, UnboundedSender<AgentMessage>>,
    /// `(pattern, queue_name)` bindings in registration order.
    bindings: Vec<(String, String)>,
}

/// Topic-exchange bus backed by in-process channels.
pub struct InMemoryBus {
    state: Mutex<BusState>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                queues: HashMap::new(),
                bindings: Vec::new(),
            }),
        }
    }

    /// Creates a queue and returns its consuming end.
    ///
    /// Re-declaring a queue replaces it; the old receiver stops getting
    /// messages.
    pub async fn declare_queue(&self, queue_name: &str) -> UnboundedReceiver<AgentMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        state.queues.insert(queue_name.to_owned(), sender);
        receiver
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: &AgentMessage) -> Result<()> {
        let mut state = self.state.lock().await;

        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|(pattern, _)| key_matches(pattern, &message.routing_key))
            .map(|(_, queue_name)| queue_name.clone())
            .collect();

        if targets.is_empty() {
            debug!(routing_key = %message.routing_key, "no queue bound for key; dropping");
            return Ok(());
        }

        for queue_name in targets {
            let Some(sender) = state.queues.get(&queue_name) else {
                continue;
            };
            if sender.send(message.clone()).is_err() {
                // Receiver is gone; drop the dead queue so later publishes
                // stop paying for it.
                state.queues.remove(&queue_name);
                return Err(Error::AgentCommunication(format!(
                    "queue {queue_name} has no consumer"
                )));
            }
        }
        Ok(())
    }

    async fn register_handler(
        &self,
        agent_id: &str,
        routing_keys: Vec<String>,
        queue_name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.queues.contains_key(queue_name) {
            return Err(Error::AgentCommunication(format!(
                "queue {queue_name} has not been declared"
            )));
        }
        debug!(agent_id, queue_name, ?routing_keys, "binding queue");
        for pattern in routing_keys {
            state.bindings.push((pattern, queue_name.to_owned()));
        }
        Ok(())
    }
}
