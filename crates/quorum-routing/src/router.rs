//! Central routing façade.
//!
//! [`LlmRouter`] owns the catalog, the per-agent configuration, the budget
//! window, and one provider adapter per catalog model. `route` is pure
//! decision-making; `execute` dispatches the decision to an adapter with
//! bounded retries.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use quorum_core::{
    AgentConfig, CompletionRequest, CompletionResponse, Error, ProviderAdapter, Result,
    RetryConfig, RouterConfig, TaskDescriptor,
};
use quorum_providers::{AnthropicAdapter, OllamaAdapter, OpenAiAdapter};

use crate::budget::{BudgetWindow, CostSummary};
use crate::catalog::ModelCatalog;
use crate::decision::RoutingDecision;
use crate::policy::StrategyKind;
use crate::rules;

/// Per-call routing inputs beyond the task itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteContext {
    /// Strategy to apply when no rule or budget override decides first.
    /// `None` means the balanced default.
    pub strategy: Option<StrategyKind>,
}

impl RouteContext {
    /// Context requesting an explicit strategy.
    #[must_use]
    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }
}

/// Routes tasks to models and dispatches completions to provider adapters.
pub struct LlmRouter {
    catalog: ModelCatalog,
    agents: HashMap<String, AgentConfig>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    unhealthy_providers: Mutex<HashSet<String>>,
    budget: Mutex<BudgetWindow>,
    retry: RetryConfig,
    fallback_model: String,
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LlmRouter {
    /// Creates a router over a catalog with a designated ultimate-fallback
    /// model.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotFound`] if the fallback id does not resolve in
    /// the catalog; every routing call must be able to land somewhere.
    pub fn new(catalog: ModelCatalog, fallback_model: impl Into<String>) -> Result<Self> {
        let fallback_model = fallback_model.into();
        catalog.get(&fallback_model)?;

        Ok(Self {
            catalog,
            agents: HashMap::new(),
            adapters: HashMap::new(),
            unhealthy_providers: Mutex::new(HashSet::new()),
            budget: Mutex::new(BudgetWindow::new(
                quorum_core::DEFAULT_DAILY_CLOUD_BUDGET,
            )),
            retry: RetryConfig::default(),
            fallback_model,
        })
    }

    /// Builds a fully wired router from configuration.
    ///
    /// Constructs one real adapter per enabled catalog model. The ultimate
    /// fallback is the first enabled local model, else the first enabled
    /// entry.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an empty or all-disabled catalog or an
    /// unknown provider name, and [`Error::MissingApiKey`] when a cloud
    /// provider's key is absent from the environment.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let catalog = if config.models.is_empty() {
            ModelCatalog::with_defaults()
        } else {
            ModelCatalog::from_config(config)
        };

        let fallback_model = catalog
            .list_enabled(None)
            .into_iter()
            .min_by_key(|descriptor| descriptor.kind == quorum_core::ModelKind::Cloud)
            .map(|descriptor| descriptor.id.clone())
            .ok_or_else(|| Error::Config("catalog has no enabled models".to_owned()))?;

        let mut router = Self::new(catalog, fallback_model)?;
        router.agents = config.agents.clone();
        router.retry = config.retry.clone();
        router.budget = Mutex::new(BudgetWindow::new(config.budget.resolved_daily_budget()));

        let timeout = Duration::from_secs(config.retry.timeout_seconds);
        let entries: Vec<_> = router
            .catalog
            .entries()
            .iter()
            .filter(|descriptor| descriptor.enabled)
            .cloned()
            .collect();
        for descriptor in entries {
            let adapter: Arc<dyn ProviderAdapter> = match descriptor.provider.as_str() {
                "anthropic" => Arc::new(
                    AnthropicAdapter::new()?
                        .with_model(descriptor.wire_id.clone())
                        .with_rate_limit(descriptor.max_requests_per_minute)
                        .with_timeout(timeout)
                        .with_costs(
                            descriptor.input_cost_per_token * 1000.0,
                            descriptor.output_cost_per_token * 1000.0,
                        ),
                ),
                "openai" => Arc::new(
                    OpenAiAdapter::new()?
                        .with_model(descriptor.wire_id.clone())
                        .with_rate_limit(descriptor.max_requests_per_minute)
                        .with_timeout(timeout)
                        .with_costs(
                            descriptor.input_cost_per_token * 1000.0,
                            descriptor.output_cost_per_token * 1000.0,
                        ),
                ),
                "ollama" => Arc::new(
                    OllamaAdapter::new(descriptor.wire_id.clone())
                        .with_rate_limit(descriptor.max_requests_per_minute),
                ),
                other => {
                    return Err(Error::Config(format!(
                        "unknown provider '{other}' for model {}",
                        descriptor.id
                    )));
                }
            };
            router.adapters.insert(descriptor.id.clone(), adapter);
        }

        Ok(router)
    }

    /// Adds or replaces an agent's routing configuration.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>, config: AgentConfig) -> Self {
        self.agents.insert(agent_id.into(), config);
        self
    }

    /// Overrides retry and timeout settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the daily cloud budget.
    #[must_use]
    pub fn with_daily_budget(self, daily_budget: f64) -> Self {
        *lock_ignoring_poison(&self.budget) = BudgetWindow::new(daily_budget);
        self
    }

    /// Registers the adapter serving a catalog model.
    pub fn register_adapter(&mut self, model_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(model_id.into(), adapter);
    }

    /// Whether a provider is currently admitted for dispatch.
    #[must_use]
    pub fn is_provider_healthy(&self, provider: &str) -> bool {
        !lock_ignoring_poison(&self.unhealthy_providers).contains(provider)
    }

    /// Decides which model should serve the task.
    ///
    /// Evaluation order: agent routing rules, budget-mode override, strategy,
    /// agent preferences, ultimate fallback. A decision is always produced.
    ///
    /// # Errors
    /// Returns [`Error::NoLocalModel`] when the privacy-first strategy is
    /// requested and no local model is enabled; no other failure escapes.
    pub fn route(
        &self,
        agent_id: &str,
        task: &TaskDescriptor,
        context: &RouteContext,
    ) -> Result<RoutingDecision> {
        let agent = self.agents.get(agent_id);

        if let Some(agent) = agent {
            if let Some(model_id) = rules::first_match(&agent.routing_rules, task) {
                if self.catalog.is_enabled(model_id) {
                    let descriptor = self.catalog.get(model_id)?;
                    return Ok(RoutingDecision::from_descriptor(
                        descriptor,
                        format!("routing rule matched for agent {agent_id}"),
                        0.95,
                        task.estimated_tokens,
                    ));
                }
                debug!(
                    agent_id,
                    model_id, "routing rule names an unavailable model; continuing"
                );
            }
        }

        let budget = lock_ignoring_poison(&self.budget).clone();

        // Budget pressure outranks strategy choice: once the circuit breaker
        // trips, an agent with a declared budget-mode model is pinned to it.
        if budget.in_budget_mode() {
            let budget_model = agent.and_then(|config| config.model_preferences.budget_mode.as_deref());
            if let Some(model_id) = budget_model {
                if self.catalog.is_enabled(model_id) {
                    let descriptor = self.catalog.get(model_id)?;
                    return Ok(RoutingDecision::from_descriptor(
                        descriptor,
                        "budget mode: daily spend over threshold",
                        0.9,
                        task.estimated_tokens,
                    ));
                }
                warn!(
                    agent_id,
                    model_id, "budget-mode model is unavailable; continuing"
                );
            }
        }

        let strategy = context.strategy.unwrap_or_default();
        if let Some(decision) = strategy.policy().select(task, &self.catalog, &budget)? {
            return Ok(decision);
        }

        if let Some(preferences) = agent.map(|config| &config.model_preferences) {
            let ranked = [
                (preferences.primary.as_deref(), 0.75, "primary"),
                (preferences.fallback.as_deref(), 0.6, "fallback"),
            ];
            for (choice, confidence, role) in ranked {
                if let Some(model_id) = choice {
                    if self.catalog.is_enabled(model_id) {
                        let descriptor = self.catalog.get(model_id)?;
                        return Ok(RoutingDecision::from_descriptor(
                            descriptor,
                            format!("agent preference: {role}"),
                            confidence,
                            task.estimated_tokens,
                        ));
                    }
                }
            }
        }

        if self.catalog.is_enabled(&self.fallback_model) {
            let descriptor = self.catalog.get(&self.fallback_model)?;
            return Ok(RoutingDecision::from_descriptor(
                descriptor,
                "default model",
                0.5,
                task.estimated_tokens,
            ));
        }

        // Last resort: the designated fallback even if disabled. Producing a
        // low-confidence decision beats producing none.
        let descriptor = self.catalog.get(&self.fallback_model)?;
        Ok(RoutingDecision::from_descriptor(
            descriptor,
            "ultimate fallback: no other route available",
            0.3,
            task.estimated_tokens,
        ))
    }

    /// Routes the task and runs the completion against the selected provider.
    ///
    /// Retryable errors back off exponentially up to `max_retries`. An
    /// [`Error::Auth`] failure marks the provider unhealthy; later calls skip
    /// it until a health probe succeeds, landing on the fallback model
    /// instead.
    ///
    /// # Errors
    /// Propagates routing errors and the final provider error once retries
    /// are exhausted.
    pub async fn execute(
        &self,
        agent_id: &str,
        task: &TaskDescriptor,
        context: &RouteContext,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let mut decision = self.route(agent_id, task, context)?;

        if !self.is_provider_healthy(&decision.provider) {
            let adapter = self.adapter_for(&decision.model_id)?;
            if adapter.health_check().await.is_healthy {
                info!(provider = %decision.provider, "provider probe succeeded; readmitting");
                lock_ignoring_poison(&self.unhealthy_providers).remove(&decision.provider);
            } else {
                let fallback = self.catalog.get(&self.fallback_model)?;
                if fallback.provider == decision.provider {
                    return Err(Error::Auth(format!(
                        "provider {} is unhealthy and no alternative exists",
                        decision.provider
                    )));
                }
                info!(
                    from = %decision.model_id,
                    to = %fallback.id,
                    "rerouting around unhealthy provider"
                );
                decision = RoutingDecision::from_descriptor(
                    fallback,
                    "ultimate fallback: selected provider unhealthy",
                    0.3,
                    task.estimated_tokens,
                );
            }
        }

        let adapter = Arc::clone(self.adapter_for(&decision.model_id)?);
        let mut attempt: u32 = 0;
        loop {
            match adapter.generate(request).await {
                Ok(response) => {
                    self.track_cost(response.cost);
                    return Ok(response);
                }
                Err(Error::Auth(message)) => {
                    warn!(provider = %decision.provider, "authentication failed; marking provider unhealthy");
                    lock_ignoring_poison(&self.unhealthy_providers)
                        .insert(decision.provider.clone());
                    return Err(Error::Auth(message));
                }
                Err(error) if error.is_retryable() && (attempt as usize) < self.retry.max_retries => {
                    let backoff = self.retry.base_backoff_ms.saturating_mul(1 << attempt);
                    let wait = match error {
                        Error::RateLimited { retry_after_ms } => backoff.max(retry_after_ms),
                        _ => backoff,
                    };
                    warn!(
                        model = %decision.model_id,
                        attempt,
                        wait_ms = wait,
                        %error,
                        "provider call failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Records spend against the daily budget window.
    pub fn track_cost(&self, cost: f64) {
        lock_ignoring_poison(&self.budget).track_cost(cost);
    }

    /// Side-effect-free budget readout.
    #[must_use]
    pub fn cost_summary(&self) -> CostSummary {
        lock_ignoring_poison(&self.budget).summary()
    }

    /// The catalog this router selects from.
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    fn adapter_for(&self, model_id: &str) -> Result<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(model_id).ok_or_else(|| {
            Error::Config(format!("no adapter registered for model {model_id}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::{
        AgentRoutingRule, ConditionField, ConditionOp, ModelPreferences, RuleCondition, RuleValue,
    };
    use quorum_providers::MockAdapter;

    fn agent_with_rule() -> AgentConfig {
        AgentConfig {
            model_preferences: ModelPreferences {
                primary: Some("claude-sonnet".to_owned()),
                fallback: Some("gpt-4o-mini".to_owned()),
                budget_mode: Some("llama-local".to_owned()),
            },
            routing_rules: vec![AgentRoutingRule {
                condition: RuleCondition {
                    field: ConditionField::Complexity,
                    op: ConditionOp::Ge,
                    value: RuleValue::Number(9.0),
                },
                model: "claude-opus".to_owned(),
            }],
        }
    }

    fn router() -> LlmRouter {
        LlmRouter::new(ModelCatalog::with_defaults(), "llama-local")
            .unwrap()
            .with_agent("backend-1", agent_with_rule())
    }

    #[test]
    fn rules_outrank_everything() {
        let router = router();
        let task = TaskDescriptor::new("rewrite the scheduler").with_complexity(9);

        let decision = router
            .route("backend-1", &task, &RouteContext::default())
            .unwrap();
        assert_eq!(decision.model_id, "claude-opus");
        assert!(decision.reason.contains("routing rule"));
    }

    #[test]
    fn budget_mode_overrides_strategy() {
        let router = router().with_daily_budget(10.0);
        router.track_cost(9.0);

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let decision = router
            .route("backend-1", &task, &RouteContext::default())
            .unwrap();
        assert_eq!(decision.model_id, "llama-local");
        assert!(decision.reason.contains("budget mode"));
    }

    #[test]
    fn budget_mode_without_budget_model_uses_strategy() {
        let router = LlmRouter::new(ModelCatalog::with_defaults(), "llama-local")
            .unwrap()
            .with_daily_budget(10.0);
        router.track_cost(9.0);

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let decision = router
            .route("unknown-agent", &task, &RouteContext::default())
            .unwrap();
        assert_eq!(decision.model_id, "claude-sonnet");
    }

    #[test]
    fn privacy_first_error_propagates() {
        let mut catalog = ModelCatalog::with_defaults();
        catalog.set_enabled("llama-local", false).unwrap();
        let router = LlmRouter::new(catalog, "claude-haiku").unwrap();

        let task = TaskDescriptor::new("handle PII");
        let result = router.route(
            "backend-1",
            &task,
            &RouteContext::with_strategy(StrategyKind::PrivacyFirst),
        );
        assert!(matches!(result, Err(Error::NoLocalModel)));
    }

    #[test]
    fn preferences_apply_when_strategy_declines() {
        // Only a mid-tier cloud model enabled: the balanced low-complexity
        // branch has no local and no low-tier cloud to pick.
        let mut catalog = ModelCatalog::with_defaults();
        for id in ["claude-opus", "claude-haiku", "gpt-4o", "gpt-4o-mini", "llama-local"] {
            catalog.set_enabled(id, false).unwrap();
        }
        let router = LlmRouter::new(catalog, "claude-sonnet")
            .unwrap()
            .with_agent("backend-1", agent_with_rule());

        let task = TaskDescriptor::new("fix typo").with_complexity(2);
        let decision = router
            .route("backend-1", &task, &RouteContext::default())
            .unwrap();
        assert_eq!(decision.model_id, "claude-sonnet");
        assert!(decision.reason.contains("primary"));
    }

    #[test]
    fn everything_disabled_still_routes() {
        let mut catalog = ModelCatalog::with_defaults();
        let ids: Vec<String> = catalog
            .entries()
            .iter()
            .map(|entry| entry.id.clone())
            .collect();
        for id in &ids {
            catalog.set_enabled(id, false).unwrap();
        }
        let router = LlmRouter::new(catalog, "llama-local").unwrap();

        let task = TaskDescriptor::new("anything");
        let decision = router
            .route("nobody", &task, &RouteContext::default())
            .unwrap();
        assert_eq!(decision.model_id, "llama-local");
        assert!((decision.confidence - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_fallback_model_is_rejected() {
        let result = LlmRouter::new(ModelCatalog::with_defaults(), "gpt-7");
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn execute_tracks_cost_on_success() {
        let mut router = router();
        let adapter = Arc::new(
            MockAdapter::new()
                .with_default_response("done")
                .with_cost_per_call(0.5),
        );
        router.register_adapter("claude-sonnet", adapter);

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let request = CompletionRequest::new("implement the endpoint");
        let response = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await
            .unwrap();

        assert_eq!(response.content, "done");
        assert!((router.cost_summary().daily_spent - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn execute_retries_transient_errors() {
        let mut router = router().with_retry(RetryConfig {
            max_retries: 2,
            base_backoff_ms: 1,
            timeout_seconds: 30,
        });
        let adapter = Arc::new(
            MockAdapter::new()
                .with_default_response("recovered")
                .with_scripted_failures(vec![Error::Transient("connection reset".to_owned())]),
        );
        router.register_adapter("claude-sonnet", adapter.clone());

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let request = CompletionRequest::new("implement the endpoint");
        let response = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await
            .unwrap();

        assert_eq!(response.content, "recovered");
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn auth_failure_marks_provider_unhealthy() {
        let mut router = router();
        let adapter = Arc::new(
            MockAdapter::new()
                .with_scripted_failures(vec![Error::Auth("invalid key".to_owned())]),
        );
        router.register_adapter("claude-sonnet", adapter);

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let request = CompletionRequest::new("implement the endpoint");
        let result = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert!(!router.is_provider_healthy("anthropic"));
    }

    #[tokio::test]
    async fn unhealthy_provider_reroutes_to_fallback() {
        let mut router = router();
        router.register_adapter(
            "claude-sonnet",
            Arc::new(
                MockAdapter::new()
                    .with_healthy(false)
                    .with_scripted_failures(vec![Error::Auth("invalid key".to_owned())]),
            ),
        );
        let local = Arc::new(MockAdapter::new().with_default_response("local answer"));
        router.register_adapter("llama-local", local.clone());

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let request = CompletionRequest::new("implement the endpoint");

        // First call trips the auth breaker for anthropic.
        let _ = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await;

        // Second call probes, fails, and lands on the fallback model.
        let response = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await
            .unwrap();
        assert_eq!(response.content, "local answer");
        assert_eq!(local.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let mut router = router().with_retry(RetryConfig {
            max_retries: 1,
            base_backoff_ms: 1,
            timeout_seconds: 30,
        });
        let adapter = Arc::new(MockAdapter::new().with_scripted_failures(vec![
            Error::Transient("reset".to_owned()),
            Error::Transient("reset again".to_owned()),
        ]));
        router.register_adapter("claude-sonnet", adapter.clone());

        let task = TaskDescriptor::new("implement endpoint").with_complexity(5);
        let request = CompletionRequest::new("implement the endpoint");
        let result = router
            .execute("backend-1", &task, &RouteContext::default(), &request)
            .await;

        assert!(matches!(result, Err(Error::Transient(_))));
        assert_eq!(adapter.call_count(), 2);
    }
}
