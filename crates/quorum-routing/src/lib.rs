//! Model routing: catalog, strategies, per-agent rules, budget tracking, and
//! the [`LlmRouter`] façade that turns a task into a provider call.

/// Daily budget window and cost summaries.
pub mod budget;
/// Model catalog.
pub mod catalog;
/// Routing decisions.
pub mod decision;
/// Selection strategies.
pub mod policy;
/// The routing façade.
pub mod router;
/// Declarative per-agent rule evaluation.
pub mod rules;

pub use budget::{BUDGET_MODE_THRESHOLD, BudgetWindow, CostSummary};
pub use catalog::{ModelCatalog, ModelDescriptor};
pub use decision::RoutingDecision;
pub use policy::{
    Balanced, CostOptimized, PerformanceOptimized, PrivacyFirst, RoutingPolicy, StrategyKind,
};
pub use router::{LlmRouter, RouteContext};
