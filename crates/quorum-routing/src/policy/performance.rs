use quorum_core::{ModelKind, Result, TaskDescriptor};

use super::RoutingPolicy;
use crate::budget::BudgetWindow;
use crate::catalog::ModelCatalog;
use crate::decision::RoutingDecision;

/// Routes to the most capable enabled cloud model by fixed tier ranking
/// (`Top > Mid > Low`). Declines when no cloud model is enabled.
pub struct PerformanceOptimized;

impl RoutingPolicy for PerformanceOptimized {
    fn name(&self) -> &'static str {
        "performance_optimized"
    }

    fn select(
        &self,
        task: &TaskDescriptor,
        catalog: &ModelCatalog,
        _budget: &BudgetWindow,
    ) -> Result<Option<RoutingDecision>> {
        let mut best: Option<&crate::catalog::ModelDescriptor> = None;
        for descriptor in catalog.list_enabled(None) {
            if descriptor.kind != ModelKind::Cloud {
                continue;
            }
            // Strictly-greater keeps the first declared entry on tier ties.
            if best.is_none_or(|current| descriptor.tier > current.tier) {
                best = Some(descriptor);
            }
        }

        Ok(best.map(|descriptor| {
            RoutingDecision::from_descriptor(
                descriptor,
                format!("performance_optimized: highest tier ({:?})", descriptor.tier),
                0.9,
                task.estimated_tokens,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy_select(catalog: &ModelCatalog) -> Option<RoutingDecision> {
        let task = TaskDescriptor::new("hard problem").with_estimated_tokens(5000);
        PerformanceOptimized
            .select(&task, catalog, &BudgetWindow::new(50.0))
            .unwrap()
    }

    #[test]
    fn picks_top_tier_cloud_model() {
        let catalog = ModelCatalog::with_defaults();
        let decision = strategy_select(&catalog).unwrap();
        assert_eq!(decision.model_id, "claude-opus");
    }

    #[test]
    fn ignores_local_models() {
        let mut catalog = ModelCatalog::with_defaults();
        for id in ["claude-opus", "claude-sonnet", "claude-haiku", "gpt-4o", "gpt-4o-mini"] {
            catalog.set_enabled(id, false).unwrap();
        }

        // Only the local model remains, so the strategy declines.
        assert!(strategy_select(&catalog).is_none());
    }

    #[test]
    fn falls_to_next_tier_when_top_disabled() {
        let mut catalog = ModelCatalog::with_defaults();
        catalog.set_enabled("claude-opus", false).unwrap();

        let decision = strategy_select(&catalog).unwrap();
        assert_eq!(decision.model_id, "claude-sonnet");
    }
}
