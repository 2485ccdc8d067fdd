use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kinds of development work a task may require.
///
/// A closed enum rather than free-form strings so agent dispatch tables and
/// rule conditions stay exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Architecture and system design decisions.
    SystemDesign,
    /// Server-side implementation work.
    Backend,
    /// Client-side implementation work.
    Frontend,
    /// Test writing and quality assurance.
    Testing,
    /// Documentation authoring.
    Documentation,
    /// Infrastructure and deployment work.
    Deployment,
    /// Code review.
    Review,
    /// Anything that does not fit a specialist bucket.
    #[default]
    General,
}

impl Display for TaskType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::SystemDesign => "system_design",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Deployment => "deployment",
            Self::Review => "review",
            Self::General => "general",
        };
        write!(formatter, "{name}")
    }
}

/// Where a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Hosted by an external vendor; costs money, sees data.
    Cloud,
    /// Runs on local hardware; free and private.
    Local,
}

impl Display for ModelKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Cloud => write!(formatter, "cloud"),
            Self::Local => write!(formatter, "local"),
        }
    }
}

/// Fixed capability-tier ranking used by performance-oriented routing.
///
/// Ordering is `Low < Mid < Top` so tiers can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap and fast; fine for routine work.
    Low,
    /// Balanced capability and cost.
    #[default]
    Mid,
    /// Most capable models available.
    Top,
}

/// Capability tags describing what a model is suited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Writing and editing source code.
    CodeGeneration,
    /// Multi-step reasoning and planning.
    Reasoning,
    /// Handling very large prompt contexts.
    LongContext,
    /// Low-latency completions.
    FastInference,
    /// Image understanding.
    Vision,
    /// General chat and summarization.
    General,
}

/// Task priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Time-sensitive work.
    High,
    /// Drop-everything work.
    Critical,
}

/// Descriptor of a unit of work as seen by the routing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Human-readable description of the work.
    pub description: String,
    /// Kind of work.
    pub task_type: TaskType,
    /// Complexity on a 1-10 scale (clamped on construction).
    pub complexity: u8,
    /// Priority of the work.
    pub priority: Priority,
    /// Rough token estimate for the prompt the task will produce.
    pub estimated_tokens: usize,
}

impl TaskDescriptor {
    /// Creates a descriptor with medium priority and complexity 5.
    #[must_use]
    pub fn new<T: Into<String>>(description: T) -> Self {
        Self {
            description: description.into(),
            task_type: TaskType::General,
            complexity: 5,
            priority: Priority::Medium,
            estimated_tokens: 0,
        }
    }

    /// Sets the task type.
    #[must_use]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Sets the complexity, clamped to the 1-10 scale.
    #[must_use]
    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity.clamp(1, 10);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the token estimate.
    #[must_use]
    pub fn with_estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = tokens;
        self
    }
}

/// Request for a single completion from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// User prompt text.
    pub prompt: String,
    /// System prompt, empty for provider default.
    pub system_prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a request with default generation settings.
    #[must_use]
    pub fn new<T: Into<String>>(prompt: T) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: String::new(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt<T: Into<String>>(mut self, system_prompt: T) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Sets the generation token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Rough token estimate for the prompt side of this request.
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        (self.prompt.len() + self.system_prompt.len()) / 4
    }
}

/// Why a completion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Model produced a natural stop.
    Stop,
    /// Generation hit the token limit.
    Length,
    /// Provider filtered the output.
    ContentFilter,
    /// Provider reported an error mid-generation.
    Error,
}

/// Normalized completion response shared by all provider adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,
    /// Token accounting for the call.
    pub usage: TokenUsage,
    /// Cost of the call in USD.
    pub cost: f64,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Provider identifier, e.g. `anthropic/claude-sonnet`.
    pub provider: String,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

/// Token usage for a single provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input: u64,
    /// Completion tokens produced.
    pub output: u64,
}

impl TokenUsage {
    /// Total tokens in both directions.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Health snapshot reported by a provider adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether the provider answered its health probe.
    pub is_healthy: bool,
    /// Probe round-trip latency.
    pub latency_ms: u64,
}

impl HealthStatus {
    /// A healthy status with the given probe latency.
    #[must_use]
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            is_healthy: true,
            latency_ms,
        }
    }

    /// An unhealthy status.
    #[must_use]
    pub fn unhealthy() -> Self {
        Self {
            is_healthy: false,
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builder_clamps_complexity() {
        let descriptor = TaskDescriptor::new("refactor the auth module").with_complexity(14);
        assert_eq!(descriptor.complexity, 10);

        let descriptor = TaskDescriptor::new("fix typo").with_complexity(0);
        assert_eq!(descriptor.complexity, 1);
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input: 1200,
            output: 340,
        };
        assert_eq!(usage.total(), 1540);
    }

    #[test]
    fn request_token_estimate() {
        let request = CompletionRequest::new("a".repeat(400)).with_system_prompt("b".repeat(80));
        assert_eq!(request.token_estimate(), 120);
    }

    #[test]
    fn task_type_serde_round_trip() {
        let json = serde_json::to_string(&TaskType::SystemDesign).unwrap();
        assert_eq!(json, "\"system_design\"");
        let parsed: TaskType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskType::SystemDesign);
    }
}
