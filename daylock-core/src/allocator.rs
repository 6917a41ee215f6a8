//! Risk allocator — splits one day's risk budget evenly across active plans.
//!
//! `risk_per_trade = floor(budget / active)`, `qty = floor(risk_per_trade / risk_per_share)`.
//! A plan whose quantity floors to zero is demoted; the remaining plans keep
//! the original split (no re-split in this pass).

use serde::{Deserialize, Serialize};

use crate::domain::TradePlan;

/// Summary of one allocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub active: usize,
    pub demoted: usize,
    pub risk_per_trade: f64,
    pub total_planned_risk: f64,
}

/// Size every plan in place. Only `quantity` and `per_trade_risk_used` are written.
pub fn allocate(plans: &mut [TradePlan], budget: f64) -> Allocation {
    let active = plans.iter().filter(|p| p.has_valid_call()).count();

    if active == 0 || !budget.is_finite() || budget <= 0.0 {
        for plan in plans.iter_mut() {
            plan.quantity = 0;
            plan.per_trade_risk_used = 0.0;
        }
        return Allocation {
            active,
            demoted: active,
            ..Allocation::default()
        };
    }

    let risk_per_trade = (budget / active as f64).floor();
    let mut demoted = 0;
    let mut total = 0.0;

    for plan in plans.iter_mut() {
        if !plan.has_valid_call() {
            plan.quantity = 0;
            plan.per_trade_risk_used = 0.0;
            continue;
        }
        let qty = (risk_per_trade / plan.risk_per_share).floor();
        if qty >= 1.0 {
            plan.quantity = qty as u64;
            plan.per_trade_risk_used = plan.quantity as f64 * plan.risk_per_share;
            total += plan.per_trade_risk_used;
        } else {
            plan.quantity = 0;
            plan.per_trade_risk_used = 0.0;
            demoted += 1;
        }
    }

    Allocation {
        active,
        demoted,
        risk_per_trade,
        total_planned_risk: total,
    }
}
