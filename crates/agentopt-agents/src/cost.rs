use std::sync::{Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Totals booked by a `CostTracker`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostSummary {
    pub total_cost: Decimal,
    pub cost_saved: Decimal,
}

/// Monotonic spend and savings counters.
///
/// Flat accounting: callers book a fixed amount per model call or per cache
/// hit, nothing here is measured from provider billing.
#[derive(Debug, Default)]
pub struct CostTracker {
    inner: Mutex<CostSummary>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book the cost of a call that reached the provider. Negative amounts are ignored.
    pub fn record_cost(&self, amount: Decimal) {
        if amount.is_sign_negative() {
            return;
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_cost += amount;
    }

    /// Book the cost avoided by serving a call from cache. Negative amounts are ignored.
    pub fn record_saving(&self, amount: Decimal) {
        if amount.is_sign_negative() {
            return;
        }
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cost_saved += amount;
    }

    pub fn total_cost(&self) -> Decimal {
        self.summary().total_cost
    }

    pub fn cost_savings(&self) -> Decimal {
        self.summary().cost_saved
    }

    pub fn summary(&self) -> CostSummary {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
