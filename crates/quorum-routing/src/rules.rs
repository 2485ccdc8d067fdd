//! Declarative per-agent routing rule evaluation.
//!
//! Rules are typed predicates over a fixed set of task fields. Evaluation is
//! fail-open: a condition that cannot be evaluated (wrong value type for the
//! field, or an ordering operator on an unordered field) does not match, and
//! routing falls through to the strategy layer.

use tracing::debug;

use quorum_core::{
    AgentRoutingRule, ConditionField, ConditionOp, Priority, RuleCondition, RuleValue,
    TaskDescriptor,
};

/// Returns the model named by the first matching rule, if any.
#[must_use]
pub fn first_match<'a>(rules: &'a [AgentRoutingRule], task: &TaskDescriptor) -> Option<&'a str> {
    rules
        .iter()
        .find(|rule| condition_matches(&rule.condition, task))
        .map(|rule| rule.model.as_str())
}

/// Evaluates a single condition against a task descriptor.
#[must_use]
pub fn condition_matches(condition: &RuleCondition, task: &TaskDescriptor) -> bool {
    match condition.field {
        ConditionField::Complexity => {
            numeric_match(condition, f64::from(task.complexity), "complexity")
        }
        ConditionField::EstimatedTokens => {
            // Token counts fit in f64's integer range for any realistic task.
            #[allow(clippy::cast_precision_loss)]
            numeric_match(condition, task.estimated_tokens as f64, "estimated_tokens")
        }
        ConditionField::TaskType => task_type_match(condition, task),
        ConditionField::Priority => priority_match(condition, task),
    }
}

fn numeric_match(condition: &RuleCondition, actual: f64, field: &str) -> bool {
    let RuleValue::Number(expected) = condition.value else {
        debug!(field, "routing rule compares numeric field to text; skipping");
        return false;
    };
    compare_f64(condition.op, actual, expected)
}

fn task_type_match(condition: &RuleCondition, task: &TaskDescriptor) -> bool {
    let RuleValue::Text(ref expected) = condition.value else {
        debug!("routing rule compares task_type to a number; skipping");
        return false;
    };
    let actual = task.task_type.to_string();
    match condition.op {
        ConditionOp::Eq => actual == *expected,
        ConditionOp::Ne => actual != *expected,
        _ => {
            debug!(op = ?condition.op, "task_type supports only eq/ne; skipping rule");
            false
        }
    }
}

fn priority_match(condition: &RuleCondition, task: &TaskDescriptor) -> bool {
    let RuleValue::Text(ref expected) = condition.value else {
        debug!("routing rule compares priority to a number; skipping");
        return false;
    };
    let Some(expected_rank) = priority_rank(expected) else {
        debug!(value = %expected, "unknown priority name in routing rule; skipping");
        return false;
    };
    let actual_rank = task.priority as u8;
    match condition.op {
        ConditionOp::Eq => actual_rank == expected_rank,
        ConditionOp::Ne => actual_rank != expected_rank,
        ConditionOp::Gt => actual_rank > expected_rank,
        ConditionOp::Ge => actual_rank >= expected_rank,
        ConditionOp::Lt => actual_rank < expected_rank,
        ConditionOp::Le => actual_rank <= expected_rank,
    }
}

fn priority_rank(name: &str) -> Option<u8> {
    let priority = match name {
        "low" => Priority::Low,
        "medium" => Priority::Medium,
        "high" => Priority::High,
        "critical" => Priority::Critical,
        _ => return None,
    };
    Some(priority as u8)
}

fn compare_f64(op: ConditionOp, actual: f64, expected: f64) -> bool {
    match op {
        ConditionOp::Eq => (actual - expected).abs() < f64::EPSILON,
        ConditionOp::Ne => (actual - expected).abs() >= f64::EPSILON,
        ConditionOp::Gt => actual > expected,
        ConditionOp::Ge => actual >= expected,
        ConditionOp::Lt => actual < expected,
        ConditionOp::Le => actual <= expected,
    }
}
