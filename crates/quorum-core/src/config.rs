//! Configuration for the model catalog, per-agent routing rules, budget, and
//! orchestrator tuning.
//!
//! Loaded from TOML with the `models` / `agents` / `budget` key layout. Every
//! section is optional and defaults are usable out of the box.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{Capability, Error, ModelKind, ModelTier, Result};

/// Environment variable bounding daily cloud spend.
pub const ENV_DAILY_CLOUD_BUDGET: &str = "DAILY_CLOUD_BUDGET";

/// Default daily cloud budget in USD.
pub const DEFAULT_DAILY_CLOUD_BUDGET: f64 = 50.0;

/// Complete router and orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Model catalog entries, keyed by catalog name.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    /// Per-agent preferences and routing rules, keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    /// Budget configuration.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Retry and timeout configuration for provider calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Orchestrator tuning knobs.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl RouterConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read and
    /// [`Error::Toml`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`Error::Toml`] if the string does not parse.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Loads from the given path, falling back to defaults if it is absent.
    ///
    /// # Errors
    /// Returns an error only for a present-but-invalid file; a missing file
    /// is not an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Looks up an agent's configuration.
    #[must_use]
    pub fn agent(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.get(agent_id)
    }
}

/// One model catalog entry as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Identifier used on the provider's wire protocol.
    pub model_id: String,
    /// Provider name (`anthropic`, `openai`, `ollama`).
    pub provider: String,
    /// Cloud or local.
    pub kind: ModelKind,
    /// Capability tier for performance-oriented ranking.
    #[serde(default)]
    pub tier: ModelTier,
    /// Capability tags.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Maximum context window in tokens.
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    /// Cost per 1000 tokens.
    #[serde(default)]
    pub cost_per_1k_tokens: CostPer1k,
    /// Provider-enforced request ceiling per minute.
    #[serde(default = "default_rpm")]
    pub max_requests_per_minute: usize,
    /// Whether the model may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Input/output cost per thousand tokens, in USD.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostPer1k {
    /// Cost per 1k prompt tokens.
    pub input: f64,
    /// Cost per 1k completion tokens.
    pub output: f64,
}

/// Per-agent model preferences and declarative routing rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Ordered model preferences.
    #[serde(default)]
    pub model_preferences: ModelPreferences,
    /// Rules evaluated before any strategy, first match wins.
    #[serde(default)]
    pub routing_rules: Vec<AgentRoutingRule>,
}

/// An agent's preferred models by role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// First choice when no rule or strategy decides.
    pub primary: Option<String>,
    /// Used when the primary is unavailable or disabled.
    pub fallback: Option<String>,
    /// Forced once the budget circuit-breaker trips.
    pub budget_mode: Option<String>,
}

/// A declarative `condition -> model` routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRoutingRule {
    /// Predicate over the task descriptor.
    pub condition: RuleCondition,
    /// Catalog name of the model to pick when the condition holds.
    pub model: String,
}

/// Safe predicate over a fixed set of task fields.
///
/// Replaces the original string-eval'd conditions with a small AST so rules
/// stay declarative without arbitrary code execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Which task field the condition inspects.
    pub field: ConditionField,
    /// Comparison operator.
    pub op: ConditionOp,
    /// Value to compare against.
    pub value: RuleValue,
}

/// Task fields a rule condition may inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    /// Task complexity on the 1-10 scale.
    Complexity,
    /// Estimated prompt token count.
    EstimatedTokens,
    /// Task type tag.
    TaskType,
    /// Task priority.
    Priority,
}

/// Comparison operators usable in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
}

/// A comparison value, numeric or symbolic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// Numeric comparison value.
    Number(f64),
    /// Symbolic comparison value (task type or priority name).
    Text(String),
}

/// Retry and timeout settings for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts for retryable errors.
    pub max_retries: usize,
    /// Base backoff between attempts; doubles each retry.
    pub base_backoff_ms: u64,
    /// Per-request deadline in seconds.
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 250,
            timeout_seconds: 30,
        }
    }
}

/// Budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily cloud spend cap in USD.
    pub daily_cloud_budget: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cloud_budget: DEFAULT_DAILY_CLOUD_BUDGET,
        }
    }
}

impl BudgetConfig {
    /// Daily budget after applying the `DAILY_CLOUD_BUDGET` env override.
    #[must_use]
    pub fn resolved_daily_budget(&self) -> f64 {
        env::var(ENV_DAILY_CLOUD_BUDGET)
            .ok()
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(self.daily_cloud_budget)
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interval between monitor sweeps.
    pub monitor_interval_secs: u64,
    /// In-progress time after which a task counts as stalled.
    pub stall_threshold_secs: u64,
    /// Heartbeat age after which an agent counts as stale.
    pub heartbeat_timeout_secs: u64,
    /// Failed attempts before a technical blocker escalates to a human.
    ///
    /// The upstream design never automated this hand-off; a bounded
    /// retry-then-escalate policy is a deliberate choice here, not inherited
    /// behavior.
    pub max_task_retries_before_escalation: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 30,
            stall_threshold_secs: 3600,
            heartbeat_timeout_secs: 300,
            max_task_retries_before_escalation: 2,
        }
    }
}

fn default_context_length() -> usize {
    128_000
}

fn default_rpm() -> usize {
    60
}

fn default_true() -> bool {
    true
}
