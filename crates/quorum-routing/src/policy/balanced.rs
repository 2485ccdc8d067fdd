use quorum_core::{ModelKind, ModelTier, Result, TaskDescriptor};

use super::RoutingPolicy;
use crate::budget::BudgetWindow;
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::decision::RoutingDecision;

/// Complexity-aware default strategy.
///
/// High-complexity tasks (8 and above) go to a top-tier cloud model, trivial
/// tasks (3 and below) stay local when possible, and the middle band takes a
/// mid-tier cloud model. Each branch degrades to the nearest available
/// alternative instead of erroring.
pub struct Balanced;

impl Balanced {
    fn first_cloud_of_tier(catalog: &ModelCatalog, tier: ModelTier) -> Option<&ModelDescriptor> {
        catalog
            .list_enabled(None)
            .into_iter()
            .find(|descriptor| descriptor.kind == ModelKind::Cloud && descriptor.tier == tier)
    }

    fn best_cloud(catalog: &ModelCatalog) -> Option<&ModelDescriptor> {
        let mut best: Option<&ModelDescriptor> = None;
        for descriptor in catalog.list_enabled(None) {
            if descriptor.kind != ModelKind::Cloud {
                continue;
            }
            if best.is_none_or(|current| descriptor.tier > current.tier) {
                best = Some(descriptor);
            }
        }
        best
    }

    fn first_local(catalog: &ModelCatalog) -> Option<&ModelDescriptor> {
        catalog
            .list_enabled(None)
            .into_iter()
            .find(|descriptor| descriptor.kind == ModelKind::Local)
    }
}

impl RoutingPolicy for Balanced {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn select(
        &self,
        task: &TaskDescriptor,
        catalog: &ModelCatalog,
        _budget: &BudgetWindow,
    ) -> Result<Option<RoutingDecision>> {
        let choice = if task.complexity >= 8 {
            Self::best_cloud(catalog)
                .map(|descriptor| (descriptor, "balanced: high complexity, top-tier cloud", 0.85))
        } else if task.complexity <= 3 {
            Self::first_local(catalog)
                .map(|descriptor| (descriptor, "balanced: low complexity, local model", 0.85))
                .or_else(|| {
                    Self::first_cloud_of_tier(catalog, ModelTier::Low).map(|descriptor| {
                        (descriptor, "balanced: low complexity, low-tier cloud", 0.7)
                    })
                })
        } else {
            Self::first_cloud_of_tier(catalog, ModelTier::Mid)
                .map(|descriptor| (descriptor, "balanced: mid complexity, mid-tier cloud", 0.8))
                .or_else(|| {
                    Self::best_cloud(catalog).map(|descriptor| {
                        (descriptor, "balanced: mid complexity, nearest cloud tier", 0.6)
                    })
                })
        };

        Ok(choice.map(|(descriptor, reason, confidence)| {
            RoutingDecision::from_descriptor(descriptor, reason, confidence, task.estimated_tokens)
        }))
    }
}
