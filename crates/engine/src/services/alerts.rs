//! Cost change and margin alerts.
//!
//! Alerts compare a fresh calculation with the previous one and with the
//! recipe's selling price. They are returned to the caller and logged, not
//! stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hpp_core::RecipeId;

use crate::models::HppCalculation;

const CHANGE_THRESHOLD: i64 = 10;
const HIGH_CHANGE_THRESHOLD: i64 = 20;
const LOW_MARGIN_THRESHOLD: i64 = 20;
const CRITICAL_MARGIN_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CostIncrease,
    CostDecrease,
    LowMargin,
}

/// A single alert raised by a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HppAlert {
    pub recipe_id: RecipeId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    /// Change or margin in percent, rounded to one decimal place.
    pub percent: Decimal,
    pub message: String,
}

/// Evaluate alerts for `current` against the previous snapshot and the
/// selling price.
#[must_use]
pub fn evaluate(
    previous: Option<&HppCalculation>,
    current: &HppCalculation,
    selling_price: Option<Decimal>,
) -> Vec<HppAlert> {
    let mut alerts = Vec::new();

    if let Some(change) = previous.and_then(|p| change_percent(p.cost_per_unit, current.cost_per_unit)) {
        let previous_cost = previous.map_or(Decimal::ZERO, |p| p.cost_per_unit);
        if change > Decimal::from(CHANGE_THRESHOLD) {
            let severity = if change > Decimal::from(HIGH_CHANGE_THRESHOLD) {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            alerts.push(HppAlert {
                recipe_id: current.recipe_id,
                kind: AlertKind::CostIncrease,
                severity,
                percent: change.round_dp(1),
                message: format!(
                    "Cost per unit rose {}% from {} to {}",
                    change.round_dp(1),
                    previous_cost,
                    current.cost_per_unit
                ),
            });
        } else if change < -Decimal::from(CHANGE_THRESHOLD) {
            alerts.push(HppAlert {
                recipe_id: current.recipe_id,
                kind: AlertKind::CostDecrease,
                severity: AlertSeverity::Low,
                percent: change.round_dp(1),
                message: format!(
                    "Cost per unit fell {}% from {} to {}",
                    change.abs().round_dp(1),
                    previous_cost,
                    current.cost_per_unit
                ),
            });
        }
    }

    if let Some(margin) = selling_price.and_then(|price| margin_percent(price, current.cost_per_unit)) {
        if margin < Decimal::from(LOW_MARGIN_THRESHOLD) {
            let severity = if margin < Decimal::from(CRITICAL_MARGIN_THRESHOLD) {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            alerts.push(HppAlert {
                recipe_id: current.recipe_id,
                kind: AlertKind::LowMargin,
                severity,
                percent: margin.round_dp(1),
                message: format!("Margin is only {}% of the selling price", margin.round_dp(1)),
            });
        }
    }

    alerts
}

/// Percentage change from `previous` to `current`; `None` without a
/// positive baseline.
fn change_percent(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous <= Decimal::ZERO {
        return None;
    }
    current
        .checked_sub(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(previous)
}

/// Margin of `price` over `cost` in percent; `None` without a positive price.
fn margin_percent(price: Decimal, cost: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    price
        .checked_sub(cost)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(price)
}
