//! Pre-authorized spending capability.
//!
//! Paid submissions require a [`SpendApproval`]. The caller obtains one
//! after the user (or a flag) has agreed to an estimate, and every
//! submission reserves its unit cost against it before the vendor is
//! called.

use std::sync::atomic::{AtomicU64, Ordering};

use cloner_models::{Cost, CostEstimate};

use crate::error::{DispatchError, DispatchResult};

/// Budget that paid submissions draw from.
#[derive(Debug)]
pub struct SpendApproval {
    budget: Cost,
    spent: AtomicU64,
}

impl SpendApproval {
    pub fn new(budget: Cost) -> Self {
        Self {
            budget,
            spent: AtomicU64::new(0),
        }
    }

    /// Approval sized exactly to an accepted estimate.
    pub fn for_estimate(estimate: &CostEstimate) -> Self {
        Self::new(estimate.total)
    }

    pub fn budget(&self) -> Cost {
        self.budget
    }

    pub fn spent(&self) -> Cost {
        Cost::from_micros(self.spent.load(Ordering::SeqCst))
    }

    pub fn remaining(&self) -> Cost {
        Cost::from_micros(self.budget.micros().saturating_sub(self.spent.load(Ordering::SeqCst)))
    }

    /// Reserve `cost`, failing without side effects when it does not fit.
    pub fn reserve(&self, cost: Cost) -> DispatchResult<()> {
        let budget = self.budget.micros();
        self.spent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |spent| {
                spent
                    .checked_add(cost.micros())
                    .filter(|total| *total <= budget)
            })
            .map(|_| ())
            .map_err(|spent| DispatchError::BudgetExceeded {
                requested: cost,
                remaining: Cost::from_micros(budget.saturating_sub(spent)),
            })
    }

    /// Return a reservation whose submission never reached the vendor.
    pub fn release(&self, cost: Cost) {
        let _ = self
            .spent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |spent| {
                Some(spent.saturating_sub(cost.micros()))
            });
    }
}
