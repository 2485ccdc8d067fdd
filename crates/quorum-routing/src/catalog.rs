//! Static model catalog.
//!
//! The catalog is immutable after load apart from the admin `set_enabled`
//! toggle. Declaration order is preserved and meaningful: selection ties are
//! broken by the first matching entry, which keeps routing deterministic
//! (but arbitrary, by design).

use quorum_core::{Capability, Error, ModelKind, ModelTier, Result, RouterConfig};

/// One model known to the routing layer.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Catalog name, referenced by decisions, rules, and preferences.
    pub id: String,
    /// Identifier used on the provider's wire protocol.
    pub wire_id: String,
    /// Provider name (`anthropic`, `openai`, `ollama`).
    pub provider: String,
    /// Cloud or local.
    pub kind: ModelKind,
    /// Capability tier for performance ranking.
    pub tier: ModelTier,
    /// Capability tags.
    pub capabilities: Vec<Capability>,
    /// Maximum context window in tokens.
    pub context_length: usize,
    /// Cost per prompt token in USD.
    pub input_cost_per_token: f64,
    /// Cost per completion token in USD.
    pub output_cost_per_token: f64,
    /// Provider-enforced request ceiling per minute.
    pub max_requests_per_minute: usize,
    /// Whether the model may be selected.
    pub enabled: bool,
}

impl ModelDescriptor {
    /// Estimated cost for a task with the given prompt token count.
    ///
    /// Assumes output roughly half the size of the prompt, which is crude but
    /// only used for decision auditing, never billing.
    #[must_use]
    pub fn estimate_cost(&self, estimated_tokens: usize) -> f64 {
        let input = estimated_tokens as f64;
        let output = input / 2.0;
        input * self.input_cost_per_token + output * self.output_cost_per_token
    }
}

/// Registry of model descriptors in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from configuration.
    ///
    /// Config maps are unordered, so entries are sorted by catalog name to
    /// keep tie-breaking reproducible across loads.
    #[must_use]
    pub fn from_config(config: &RouterConfig) -> Self {
        let mut names: Vec<&String> = config.models.keys().collect();
        names.sort();

        let mut catalog = Self::new();
        for name in names {
            let model = &config.models[name];
            catalog.push(ModelDescriptor {
                id: name.clone(),
                wire_id: model.model_id.clone(),
                provider: model.provider.clone(),
                kind: model.kind,
                tier: model.tier,
                capabilities: model.capabilities.clone(),
                context_length: model.context_length,
                input_cost_per_token: model.cost_per_1k_tokens.input / 1000.0,
                output_cost_per_token: model.cost_per_1k_tokens.output / 1000.0,
                max_requests_per_minute: model.max_requests_per_minute,
                enabled: model.enabled,
            });
        }
        catalog
    }

    /// Builds the default catalog used when no configuration is supplied.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.push(ModelDescriptor {
            id: "claude-opus".to_owned(),
            wire_id: "claude-opus-4-20250514".to_owned(),
            provider: "anthropic".to_owned(),
            kind: ModelKind::Cloud,
            tier: ModelTier::Top,
            capabilities: vec![
                Capability::Reasoning,
                Capability::CodeGeneration,
                Capability::LongContext,
            ],
            context_length: 200_000,
            input_cost_per_token: 0.000_015,
            output_cost_per_token: 0.000_075,
            max_requests_per_minute: 20,
            enabled: true,
        });
        catalog.push(ModelDescriptor {
            id: "claude-sonnet".to_owned(),
            wire_id: "claude-sonnet-4-20250514".to_owned(),
            provider: "anthropic".to_owned(),
            kind: ModelKind::Cloud,
            tier: ModelTier::Mid,
            capabilities: vec![
                Capability::CodeGeneration,
                Capability::Reasoning,
                Capability::LongContext,
            ],
            context_length: 200_000,
            input_cost_per_token: 0.000_003,
            output_cost_per_token: 0.000_015,
            max_requests_per_minute: 50,
            enabled: true,
        });
        catalog.push(ModelDescriptor {
            id: "claude-haiku".to_owned(),
            wire_id: "claude-3-5-haiku-20241022".to_owned(),
            provider: "anthropic".to_owned(),
            kind: ModelKind::Cloud,
            tier: ModelTier::Low,
            capabilities: vec![Capability::FastInference, Capability::General],
            context_length: 200_000,
            input_cost_per_token: 0.000_000_8,
            output_cost_per_token: 0.000_004,
            max_requests_per_minute: 50,
            enabled: true,
        });
        catalog.push(ModelDescriptor {
            id: "gpt-4o".to_owned(),
            wire_id: "gpt-4o".to_owned(),
            provider: "openai".to_owned(),
            kind: ModelKind::Cloud,
            tier: ModelTier::Mid,
            capabilities: vec![
                Capability::CodeGeneration,
                Capability::Reasoning,
                Capability::Vision,
            ],
            context_length: 128_000,
            input_cost_per_token: 0.000_002_5,
            output_cost_per_token: 0.000_01,
            max_requests_per_minute: 60,
            enabled: true,
        });
        catalog.push(ModelDescriptor {
            id: "gpt-4o-mini".to_owned(),
            wire_id: "gpt-4o-mini".to_owned(),
            provider: "openai".to_owned(),
            kind: ModelKind::Cloud,
            tier: ModelTier::Low,
            capabilities: vec![Capability::FastInference, Capability::General],
            context_length: 128_000,
            input_cost_per_token: 0.000_000_15,
            output_cost_per_token: 0.000_000_6,
            max_requests_per_minute: 120,
            enabled: true,
        });
        catalog.push(ModelDescriptor {
            id: "llama-local".to_owned(),
            wire_id: "llama3.1:8b".to_owned(),
            provider: "ollama".to_owned(),
            kind: ModelKind::Local,
            tier: ModelTier::Low,
            capabilities: vec![Capability::General, Capability::CodeGeneration],
            context_length: 32_000,
            input_cost_per_token: 0.0,
            output_cost_per_token: 0.0,
            max_requests_per_minute: 120,
            enabled: true,
        });
        catalog
    }

    /// Appends a descriptor, keeping declaration order.
    pub fn push(&mut self, descriptor: ModelDescriptor) {
        self.entries.push(descriptor);
    }

    /// Looks up a model by catalog name.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotFound`] for unknown names; callers are
    /// expected to hold a fallback.
    pub fn get(&self, model_id: &str) -> Result<&ModelDescriptor> {
        self.entries
            .iter()
            .find(|entry| entry.id == model_id)
            .ok_or_else(|| Error::ModelNotFound(model_id.to_owned()))
    }

    /// Whether a model exists and is enabled.
    #[must_use]
    pub fn is_enabled(&self, model_id: &str) -> bool {
        self.get(model_id).map(|entry| entry.enabled).unwrap_or(false)
    }

    /// Enabled models, optionally filtered by provider, in declaration order.
    #[must_use]
    pub fn list_enabled(&self, provider: Option<&str>) -> Vec<&ModelDescriptor> {
        self.entries
            .iter()
            .filter(|entry| entry.enabled)
            .filter(|entry| provider.is_none_or(|name| entry.provider == name))
            .collect()
    }

    /// All entries in declaration order, including disabled ones.
    #[must_use]
    pub fn entries(&self) -> &[ModelDescriptor] {
        &self.entries
    }

    /// Admin toggle for a model's availability.
    ///
    /// # Errors
    /// Returns [`Error::ModelNotFound`] for unknown names.
    pub fn set_enabled(&mut self, model_id: &str, enabled: bool) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == model_id)
            .ok_or_else(|| Error::ModelNotFound(model_id.to_owned()))?;
        entry.enabled = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_local_and_cloud_entries() {
        let catalog = ModelCatalog::with_defaults();
        let locals: Vec<_> = catalog
            .list_enabled(None)
            .into_iter()
            .filter(|entry| entry.kind == ModelKind::Local)
            .collect();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].id, "llama-local");

        assert!(catalog.get("claude-opus").is_ok());
        assert_eq!(catalog.get("claude-opus").unwrap().tier, ModelTier::Top);
    }

    #[test]
    fn unknown_model_is_not_found() {
        let catalog = ModelCatalog::with_defaults();
        let result = catalog.get("gpt-7");
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[test]
    fn disabled_models_are_filtered() {
        let mut catalog = ModelCatalog::with_defaults();
        catalog.set_enabled("llama-local", false).unwrap();

        assert!(!catalog.is_enabled("llama-local"));
        assert!(
            catalog
                .list_enabled(None)
                .iter()
                .all(|entry| entry.id != "llama-local")
        );
        // get() still resolves, decisions check `enabled` separately
        assert!(catalog.get("llama-local").is_ok());
    }

    #[test]
    fn provider_filter() {
        let catalog = ModelCatalog::with_defaults();
        let anthropic = catalog.list_enabled(Some("anthropic"));
        assert_eq!(anthropic.len(), 3);
        assert!(anthropic.iter().all(|entry| entry.provider == "anthropic"));
    }

    #[test]
    fn local_models_cost_nothing() {
        let catalog = ModelCatalog::with_defaults();
        let local = catalog.get("llama-local").unwrap();
        assert!(local.estimate_cost(100_000).abs() < f64::EPSILON);

        let opus = catalog.get("claude-opus").unwrap();
        assert!(opus.estimate_cost(10_000) > 0.0);
    }

    #[test]
    fn from_config_sorts_by_name_for_determinism() {
        let config = RouterConfig::from_toml_str(
            r#"
            [models.zeta]
            model_id = "z"
            provider = "openai"
            kind = "cloud"

            [models.alpha]
            model_id = "a"
            provider = "anthropic"
            kind = "cloud"
            cost_per_1k_tokens = { input = 3.0, output = 15.0 }
            "#,
        )
        .unwrap();

        let catalog = ModelCatalog::from_config(&config);
        let ids: Vec<_> = catalog.entries().iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);

        // Per-1k config costs become per-token descriptor costs.
        let alpha = catalog.get("alpha").unwrap();
        assert!((alpha.input_cost_per_token - 0.003).abs() < 1e-12);
    }
}
