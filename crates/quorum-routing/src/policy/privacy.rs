use quorum_core::{Error, ModelKind, Result, TaskDescriptor};

use super::RoutingPolicy;
use crate::budget::BudgetWindow;
use crate::catalog::ModelCatalog;
use crate::decision::RoutingDecision;

/// Routes to local models only.
///
/// This strategy never downgrades to a cloud model: if no enabled local model
/// exists the call fails with [`Error::NoLocalModel`] so the caller learns the
/// privacy requirement cannot be met, rather than silently leaking the task
/// to a cloud provider.
pub struct PrivacyFirst;

impl RoutingPolicy for PrivacyFirst {
    fn name(&self) -> &'static str {
        "privacy_first"
    }

    fn select(
        &self,
        task: &TaskDescriptor,
        catalog: &ModelCatalog,
        _budget: &BudgetWindow,
    ) -> Result<Option<RoutingDecision>> {
        let local = catalog
            .list_enabled(None)
            .into_iter()
            .find(|descriptor| descriptor.kind == ModelKind::Local)
            .ok_or(Error::NoLocalModel)?;

        Ok(Some(RoutingDecision::from_descriptor(
            local,
            "privacy_first: local model required",
            1.0,
            task.estimated_tokens,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy_select(catalog: &ModelCatalog) -> Result<Option<RoutingDecision>> {
        let task = TaskDescriptor::new("sensitive data").with_estimated_tokens(2000);
        PrivacyFirst.select(&task, catalog, &BudgetWindow::new(50.0))
    }

    #[test]
    fn selects_local_model() {
        let catalog = ModelCatalog::with_defaults();
        let decision = strategy_select(&catalog).unwrap().unwrap();
        assert_eq!(decision.model_id, "llama-local");
        assert_eq!(decision.kind, ModelKind::Local);
    }

    #[test]
    fn errors_rather_than_routing_to_cloud() {
        let mut catalog = ModelCatalog::with_defaults();
        catalog.set_enabled("llama-local", false).unwrap();

        let err = strategy_select(&catalog).unwrap_err();
        assert!(matches!(err, Error::NoLocalModel));
    }
}
