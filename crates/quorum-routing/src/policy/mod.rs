//! Routing strategies.
//!
//! Each strategy inspects the task descriptor, the catalog, and the current
//! budget window and proposes a model, or declines. Ties within a strategy
//! are broken by catalog declaration order: deterministic but arbitrary.

/// Balanced complexity-branching strategy.
pub mod balanced;
/// Cost-minimizing strategy.
pub mod cost;
/// Capability-maximizing strategy.
pub mod performance;
/// Local-only strategy.
pub mod privacy;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use quorum_core::{Result, TaskDescriptor};

use crate::budget::BudgetWindow;
use crate::catalog::ModelCatalog;
use crate::decision::RoutingDecision;

pub use balanced::Balanced;
pub use cost::CostOptimized;
pub use performance::PerformanceOptimized;
pub use privacy::PrivacyFirst;

/// A named model-selection strategy.
pub trait RoutingPolicy: Send + Sync {
    /// Strategy name as used in routing contexts.
    fn name(&self) -> &'static str;

    /// Proposes a model for the task, or declines with `Ok(None)`.
    ///
    /// # Errors
    /// Only [`PrivacyFirst`] fails hard (no local model is a correctness
    /// violation, not a preference miss); other strategies decline instead
    /// of erroring.
    fn select(
        &self,
        task: &TaskDescriptor,
        catalog: &ModelCatalog,
        budget: &BudgetWindow,
    ) -> Result<Option<RoutingDecision>>;
}

/// The strategies a routing context can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Minimize spend.
    CostOptimized,
    /// Maximize capability.
    PerformanceOptimized,
    /// Local models only, hard requirement.
    PrivacyFirst,
    /// Complexity-aware default.
    #[default]
    Balanced,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(raw: &str) -> core::result::Result<Self, Self::Err> {
        match raw {
            "cost_optimized" => Ok(Self::CostOptimized),
            "performance_optimized" => Ok(Self::PerformanceOptimized),
            "privacy_first" => Ok(Self::PrivacyFirst),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!("unknown routing strategy: {other}")),
        }
    }
}

impl StrategyKind {
    /// Instantiates the strategy this kind names.
    #[must_use]
    pub fn policy(self) -> Box<dyn RoutingPolicy> {
        match self {
            Self::CostOptimized => Box::new(CostOptimized),
            Self::PerformanceOptimized => Box::new(PerformanceOptimized),
            Self::PrivacyFirst => Box::new(PrivacyFirst),
            Self::Balanced => Box::new(Balanced),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            "privacy_first".parse::<StrategyKind>().unwrap(),
            StrategyKind::PrivacyFirst
        );
        assert_eq!(
            "balanced".parse::<StrategyKind>().unwrap(),
            StrategyKind::Balanced
        );
        assert!("best_effort".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn default_strategy_is_balanced() {
        assert_eq!(StrategyKind::default(), StrategyKind::Balanced);
    }
}
