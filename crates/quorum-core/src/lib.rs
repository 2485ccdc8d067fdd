//! Shared types, error taxonomy, configuration, and provider trait for the
//! quorum multi-agent orchestration core.

/// Configuration types and TOML loading.
pub mod config;
/// Error taxonomy and result alias.
pub mod error;
/// Streaming completion support.
pub mod stream;
/// Provider adapter trait.
pub mod traits;
/// Shared data types.
pub mod types;

pub use config::{
    AgentConfig, AgentRoutingRule, BudgetConfig, ConditionField, ConditionOp, CostPer1k,
    DEFAULT_DAILY_CLOUD_BUDGET, ENV_DAILY_CLOUD_BUDGET, ModelConfig, ModelPreferences,
    OrchestratorConfig, RetryConfig, RouterConfig, RuleCondition, RuleValue,
};
pub use error::{Error, Result};
pub use stream::CompletionStream;
pub use traits::ProviderAdapter;
pub use types::{
    Capability, CompletionRequest, CompletionResponse, FinishReason, HealthStatus, ModelKind, ModelTier,
    Priority, TaskDescriptor, TaskType, TokenUsage,
};
