//! Daily cloud-spend tracking.
//!
//! Spend is tracked against an explicit 24-hour window rather than a bare
//! running float, so resets are a modeled rollover instead of a process
//! restart side effect.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fraction of the daily budget at which budget mode engages.
pub const BUDGET_MODE_THRESHOLD: f64 = 0.8;

/// Running spend total over a rolling 24-hour window.
#[derive(Debug, Clone)]
pub struct BudgetWindow {
    /// When the current window opened.
    window_start: DateTime<Utc>,
    /// Spend accumulated inside the current window, in USD.
    spent: f64,
    /// Daily cap in USD.
    daily_budget: f64,
}

/// Point-in-time budget readout for operators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Spend inside the current window.
    pub daily_spent: f64,
    /// Configured daily cap.
    pub daily_budget: f64,
    /// Cap minus spend, floored at zero.
    pub remaining_budget: f64,
}

impl BudgetWindow {
    /// Opens a window starting now with the given daily cap.
    #[must_use]
    pub fn new(daily_budget: f64) -> Self {
        Self::starting_at(daily_budget, Utc::now())
    }

    /// Opens a window at an explicit instant (testing).
    #[must_use]
    pub fn starting_at(daily_budget: f64, window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            spent: 0.0,
            daily_budget,
        }
    }

    /// Records cost from a completed model invocation.
    ///
    /// Rolls the window over first if it is a day old, so stale windows never
    /// keep the circuit breaker latched across days.
    pub fn track_cost(&mut self, cost: f64) {
        self.track_cost_at(cost, Utc::now());
    }

    /// [`Self::track_cost`] with an explicit clock (testing).
    pub fn track_cost_at(&mut self, cost: f64, now: DateTime<Utc>) {
        self.rollover_if_elapsed(now);
        self.spent += cost.max(0.0);
    }

    /// Starts a fresh window if 24 hours have passed since `window_start`.
    pub fn rollover_if_elapsed(&mut self, now: DateTime<Utc>) {
        if now - self.window_start >= Duration::hours(24) {
            self.window_start = now;
            self.spent = 0.0;
        }
    }

    /// Whether spend has crossed the budget-mode threshold.
    ///
    /// Once tripped this stays in effect until the window rolls over; there
    /// is no hysteresis on purpose.
    #[must_use]
    pub fn in_budget_mode(&self) -> bool {
        self.daily_budget > 0.0 && self.spent >= self.daily_budget * BUDGET_MODE_THRESHOLD
    }

    /// Spend inside the current window.
    #[must_use]
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Side-effect-free readout of the current window.
    #[must_use]
    pub fn summary(&self) -> CostSummary {
        CostSummary {
            daily_spent: self.spent,
            daily_budget: self.daily_budget,
            remaining_budget: (self.daily_budget - self.spent).max(0.0),
        }
    }
}
