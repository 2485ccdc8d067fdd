use quorum_core::{ModelKind, Result, TaskDescriptor};

use super::RoutingPolicy;
use crate::budget::BudgetWindow;
use crate::catalog::ModelCatalog;
use crate::decision::RoutingDecision;

/// Routes to the cheapest enabled model.
///
/// Any enabled local model wins outright (zero cost); otherwise the enabled
/// cloud model with the lowest input token cost is selected. The first
/// declared entry wins cost ties.
pub struct CostOptimized;

impl RoutingPolicy for CostOptimized {
    fn name(&self) -> &'static str {
        "cost_optimized"
    }

    fn select(
        &self,
        task: &TaskDescriptor,
        catalog: &ModelCatalog,
        _budget: &BudgetWindow,
    ) -> Result<Option<RoutingDecision>> {
        let enabled = catalog.list_enabled(None);

        if let Some(local) = enabled
            .iter()
            .find(|descriptor| descriptor.kind == ModelKind::Local)
        {
            return Ok(Some(RoutingDecision::from_descriptor(
                local,
                "cost_optimized: local model is free",
                0.9,
                task.estimated_tokens,
            )));
        }

        // No local model: cheapest cloud by input cost, first declared wins.
        let mut cheapest: Option<&crate::catalog::ModelDescriptor> = None;
        for descriptor in enabled {
            let is_cheaper = cheapest.is_none_or(|best| {
                descriptor.input_cost_per_token < best.input_cost_per_token
            });
            if is_cheaper {
                cheapest = Some(descriptor);
            }
        }

        Ok(cheapest.map(|descriptor| {
            RoutingDecision::from_descriptor(
                descriptor,
                "cost_optimized: cheapest enabled cloud model",
                0.8,
                task.estimated_tokens,
            )
        }))
    }
}
