use serde::{Deserialize, Serialize};

use quorum_core::ModelKind;

use crate::catalog::ModelDescriptor;

/// The outcome of one routing call: which model to use and why.
///
/// Decisions are produced per call and not persisted; the `reason` and
/// `confidence` fields exist so an operator can audit why a model was chosen,
/// including on degraded fallback paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Catalog name of the selected model.
    pub model_id: String,
    /// Provider that serves the model.
    pub provider: String,
    /// Cloud or local.
    pub kind: ModelKind,
    /// Human-readable rationale for the selection.
    pub reason: String,
    /// Confidence in the selection, 0.0 to 1.0.
    pub confidence: f64,
    /// Estimated cost of serving the task with this model, in USD.
    pub estimated_cost: f64,
}

impl RoutingDecision {
    /// Builds a decision for a catalog entry.
    #[must_use]
    pub fn from_descriptor(
        descriptor: &ModelDescriptor,
        reason: impl Into<String>,
        confidence: f64,
        estimated_tokens: usize,
    ) -> Self {
        Self {
            model_id: descriptor.id.clone(),
            provider: descriptor.provider.clone(),
            kind: descriptor.kind,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            estimated_cost: descriptor.estimate_cost(estimated_tokens),
        }
    }
}
