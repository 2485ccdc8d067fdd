//! Agent directory, message envelope/bus, and agent-to-agent message routing.

/// Agent registry and task-fit scoring.
pub mod directory;
/// Message envelope and bus seam.
pub mod message;
/// Message resolution and failover.
pub mod router;

pub use directory::{
    AgentDirectory, AgentHealth, AgentRecord, AgentType, DEFAULT_HEARTBEAT_TIMEOUT,
};
pub use message::{AgentMessage, InMemoryBus, MessageBus, MessageType, key_matches};
pub use router::{
    BROADCAST_EXCHANGE, DIRECT_EXCHANGE, DeliveryDecision, LoadBalancing, MessageRouter,
    TOPIC_EXCHANGE, agent_queue,
};
