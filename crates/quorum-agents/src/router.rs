//! Agent-to-agent message routing.
//!
//! [`MessageRouter`] turns a message plus the current directory state into a
//! [`DeliveryDecision`]: which exchange and queue the bus should use, or a
//! described failure. Resolution never raises; "nobody can take this" is a
//! decision, not an error, so callers can log it and move on.

use std::collections::HashMap;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use quorum_core::TaskType;

use crate::directory::{AgentDirectory, AgentRecord, AgentType};
use crate::message::{AgentMessage, MessageType};

/// Exchange for directly-addressed messages.
pub const DIRECT_EXCHANGE: &str = "quorum.direct";
/// Exchange that fans out to every agent.
pub const BROADCAST_EXCHANGE: &str = "quorum.broadcast";
/// Default topic exchange for everything else.
pub const TOPIC_EXCHANGE: &str = "quorum.topic";

/// How to pick one agent out of several viable candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Lowest workload ratio wins.
    #[default]
    LeastLoaded,
    /// Lowest average response latency wins.
    Fastest,
    /// Highest health score wins.
    BestHealth,
    /// Uniform random choice.
    Random,
}

/// The outcome of resolving one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDecision {
    /// Routing key to publish with.
    pub routing_key: String,
    /// Exchange to publish to.
    pub exchange: String,
    /// Concrete queue, when the decision pins one agent.
    pub queue_name: Option<String>,
    /// Whether a viable delivery target was found.
    pub success: bool,
    /// Human-readable explanation of the outcome.
    pub reason: String,
    /// Extra context, e.g. `original_recipient` after a failover.
    pub metadata: HashMap<String, String>,
}

impl DeliveryDecision {
    fn success(
        routing_key: impl Into<String>,
        exchange: &str,
        queue_name: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            exchange: exchange.to_owned(),
            queue_name,
            success: true,
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }

    fn failure(routing_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            exchange: TOPIC_EXCHANGE.to_owned(),
            queue_name: None,
            success: false,
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Queue an agent consumes from.
#[must_use]
pub fn agent_queue(agent_id: &str) -> String {
    format!("agent.{agent_id}.queue")
}

/// Resolves messages against directory state.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter {
    load_balancing: LoadBalancing,
}

impl MessageRouter {
    /// Creates a router with least-loaded balancing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the load-balancing strategy.
    #[must_use]
    pub fn with_load_balancing(mut self, load_balancing: LoadBalancing) -> Self {
        self.load_balancing = load_balancing;
        self
    }

    /// Decides where a message should be delivered.
    ///
    /// Resolution order: direct recipient, broadcast, type key, capability
    /// key, task-delegation dispatch, and finally key-pattern passthrough.
    #[must_use]
    pub fn resolve(&self, message: &AgentMessage, directory: &AgentDirectory) -> DeliveryDecision {
        if let Some(recipient_id) = message.recipient_id.as_deref() {
            return self.resolve_direct(message, directory, recipient_id);
        }

        if message.message_type == MessageType::Broadcast
            || message.routing_key == "*"
            || message.routing_key.starts_with("agent.broadcast")
        {
            return DeliveryDecision::success(
                &message.routing_key,
                BROADCAST_EXCHANGE,
                None,
                "broadcast to all agents",
            );
        }

        if let Some(type_name) = message.routing_key.strip_prefix("agent.type.") {
            return self.resolve_by_type(message, directory, type_name);
        }

        if let Some(capability_name) = message.routing_key.strip_prefix("agent.capability.") {
            return self.resolve_by_capability(message, directory, capability_name);
        }

        if matches!(
            message.message_type,
            MessageType::TaskDelegation | MessageType::TaskAssignment
        ) {
            return Self::resolve_delegation(message, directory);
        }

        DeliveryDecision::success(
            &message.routing_key,
            TOPIC_EXCHANGE,
            None,
            "key-pattern passthrough",
        )
    }

    fn resolve_direct(
        &self,
        message: &AgentMessage,
        directory: &AgentDirectory,
        recipient_id: &str,
    ) -> DeliveryDecision {
        if directory.is_available(recipient_id) {
            return DeliveryDecision::success(
                format!("agent.{recipient_id}"),
                DIRECT_EXCHANGE,
                Some(agent_queue(recipient_id)),
                format!("direct delivery to {recipient_id}"),
            );
        }

        // Failover: a healthy peer of the same type, never the sender and
        // never the agent that just proved unreachable.
        let Some(agent_type) = directory.get(recipient_id).map(|record| record.agent_type) else {
            return DeliveryDecision::failure(
                &message.routing_key,
                format!("recipient {recipient_id} is unknown and has no peers"),
            );
        };

        let peers: Vec<&AgentRecord> = directory
            .find_by_type(agent_type, true)
            .into_iter()
            .filter(|record| record.agent_id != recipient_id)
            .filter(|record| record.agent_id != message.sender_id)
            .collect();

        match self.pick(peers) {
            Some(peer) => {
                debug!(
                    original = recipient_id,
                    failover = %peer.agent_id,
                    "recipient unavailable; failing over"
                );
                let mut decision = DeliveryDecision::success(
                    format!("agent.{}", peer.agent_id),
                    DIRECT_EXCHANGE,
                    Some(agent_queue(&peer.agent_id)),
                    format!("failover from {recipient_id} to {}", peer.agent_id),
                );
                decision
                    .metadata
                    .insert("original_recipient".to_owned(), recipient_id.to_owned());
                decision
            }
            None => DeliveryDecision::failure(
                &message.routing_key,
                format!("recipient {recipient_id} unavailable and no healthy peer exists"),
            ),
        }
    }

    fn resolve_by_type(
        &self,
        message: &AgentMessage,
        directory: &AgentDirectory,
        type_name: &str,
    ) -> DeliveryDecision {
        let Ok(agent_type) = AgentType::from_str(type_name) else {
            return DeliveryDecision::failure(
                &message.routing_key,
                format!("unknown agent type in routing key: {type_name}"),
            );
        };

        match self.pick(directory.find_by_type(agent_type, true)) {
            Some(agent) => DeliveryDecision::success(
                format!("agent.{}", agent.agent_id),
                DIRECT_EXCHANGE,
                Some(agent_queue(&agent.agent_id)),
                format!("routed to {} agent {}", agent_type, agent.agent_id),
            ),
            None => DeliveryDecision::failure(
                &message.routing_key,
                format!("no healthy {agent_type} agent available"),
            ),
        }
    }

    fn resolve_by_capability(
        &self,
        message: &AgentMessage,
        directory: &AgentDirectory,
        capability_name: &str,
    ) -> DeliveryDecision {
        let Ok(task_type) =
            serde_json::from_value::<TaskType>(serde_json::Value::String(capability_name.to_owned()))
        else {
            return DeliveryDecision::failure(
                &message.routing_key,
                format!("unknown capability in routing key: {capability_name}"),
            );
        };

        match self.pick(directory.find_by_capability(task_type)) {
            Some(agent) => DeliveryDecision::success(
                format!("agent.{}", agent.agent_id),
                DIRECT_EXCHANGE,
                Some(agent_queue(&agent.agent_id)),
                format!("routed to capability holder {}", agent.agent_id),
            ),
            None => DeliveryDecision::failure(
                &message.routing_key,
                format!("no live agent advertises capability {task_type}"),
            ),
        }
    }

    fn resolve_delegation(message: &AgentMessage, directory: &AgentDirectory) -> DeliveryDecision {
        let candidates: Vec<&AgentRecord> = directory
            .all()
            .into_iter()
            .filter(|record| directory.is_available(&record.agent_id))
            .filter(|record| record.has_capacity())
            .filter(|record| record.agent_id != message.sender_id)
            .collect();

        // Delegation always goes to the least-loaded agent regardless of the
        // configured balancing strategy.
        match pick_least_loaded(candidates) {
            Some(agent) => DeliveryDecision::success(
                format!("agent.{}", agent.agent_id),
                DIRECT_EXCHANGE,
                Some(agent_queue(&agent.agent_id)),
                format!("delegated to least-loaded agent {}", agent.agent_id),
            ),
            None => DeliveryDecision::failure(
                &message.routing_key,
                "no agent has spare capacity for delegation",
            ),
        }
    }

    fn pick<'a>(&self, candidates: Vec<&'a AgentRecord>) -> Option<&'a AgentRecord> {
        if candidates.is_empty() {
            return None;
        }
        match self.load_balancing {
            LoadBalancing::LeastLoaded => pick_least_loaded(candidates),
            LoadBalancing::Fastest => candidates
                .into_iter()
                .min_by_key(|record| (record.avg_response_ms, record.agent_id.clone())),
            LoadBalancing::BestHealth => candidates.into_iter().max_by(|a, b| {
                a.health
                    .health_score
                    .total_cmp(&b.health.health_score)
                    .then_with(|| b.agent_id.cmp(&a.agent_id))
            }),
            LoadBalancing::Random => candidates.choose(&mut rand::thread_rng()).copied(),
        }
    }
}

fn pick_least_loaded<'a>(candidates: Vec<&'a AgentRecord>) -> Option<&'a AgentRecord> {
    candidates.into_iter().min_by(|a, b| {
        a.workload_ratio()
            .total_cmp(&b.workload_ratio())
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    })
}
