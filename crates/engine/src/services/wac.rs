//! Weighted average cost (WAC) tracking.
//!
//! The WAC adjustment is the per-unit difference between what recent
//! purchases actually cost and the ingredients' current prices. It is added
//! to `cost_per_unit` on its own and never blended into material cost.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hpp_core::{AccountId, IngredientId};

use crate::config::CostingConfig;
use crate::db::CostStore;
use crate::error::Result;
use crate::models::{PurchaseQuery, StockTransaction};
use crate::money;

/// Price differences below this are treated as noise.
fn wac_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// A resolved recipe line as seen by the WAC calculation.
#[derive(Debug, Clone, Copy)]
pub struct WacLine {
    pub ingredient_id: IngredientId,
    pub quantity: Decimal,
    pub current_price: Decimal,
}

/// One ingredient's contribution to the adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientWacDelta {
    pub ingredient_id: IngredientId,
    pub wac: Decimal,
    pub current_price: Decimal,
    /// `(wac - current_price) * (quantity / servings)`.
    pub contribution: Decimal,
}

/// Per-unit WAC adjustment with its per-ingredient parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WacAdjustment {
    pub per_unit: Decimal,
    pub deltas: Vec<IngredientWacDelta>,
}

/// Running WAC after one purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WacPoint {
    pub at: DateTime<Utc>,
    pub quantity: Decimal,
    pub value: Decimal,
    pub running_wac: Decimal,
}

pub struct WacCalculator<'a, S> {
    store: &'a S,
    config: &'a CostingConfig,
}

impl<'a, S: CostStore> WacCalculator<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, config: &'a CostingConfig) -> Self {
        Self { store, config }
    }

    /// Per-unit WAC adjustment for a set of recipe lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the purchase read fails or the arithmetic is not
    /// representable.
    #[instrument(skip_all, fields(account = %account, lines = lines.len()))]
    pub async fn adjustment(
        &self,
        account: AccountId,
        lines: &[WacLine],
        servings: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WacAdjustment> {
        // Quantities of repeated ingredients are combined.
        let mut by_ingredient: BTreeMap<IngredientId, (Decimal, Decimal)> = BTreeMap::new();
        for line in lines {
            let entry = by_ingredient
                .entry(line.ingredient_id)
                .or_insert((Decimal::ZERO, line.current_price));
            entry.0 = money::add(entry.0, line.quantity)?;
        }

        if by_ingredient.is_empty() {
            return Ok(WacAdjustment::default());
        }

        let purchases = self
            .store
            .purchase_transactions(
                account,
                &PurchaseQuery {
                    ingredient_ids: by_ingredient.keys().copied().collect(),
                    since: Some(now - Duration::days(self.config.wac_lookback_days)),
                    limit: Some(self.config.wac_transaction_limit),
                },
            )
            .await?;

        if purchases.is_empty() {
            debug!("No purchases in the lookback window");
            return Ok(WacAdjustment::default());
        }

        let mut deltas = Vec::new();
        for (ingredient_id, (quantity, current_price)) in by_ingredient {
            let Some(wac) = weighted_average(
                purchases.iter().filter(|p| p.ingredient_id == ingredient_id),
            )?
            else {
                continue;
            };

            let difference = money::sub(wac, current_price)?;
            if difference.abs() < wac_tolerance() {
                continue;
            }

            let contribution = money::mul(difference, money::div(quantity, servings)?)?;
            deltas.push(IngredientWacDelta {
                ingredient_id,
                wac,
                current_price,
                contribution,
            });
        }

        let per_unit = money::sum(deltas.iter().map(|d| d.contribution))?;
        debug!(per_unit = %per_unit, adjusted = deltas.len(), "WAC adjustment");

        Ok(WacAdjustment { per_unit, deltas })
    }

    /// WAC of one ingredient over its full purchase history.
    ///
    /// Returns `None` when the ingredient has no purchases with quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the purchase read fails or the arithmetic is not
    /// representable.
    #[instrument(skip_all, fields(account = %account, ingredient = %ingredient_id))]
    pub async fn ingredient_wac(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Option<Decimal>> {
        let purchases = self
            .store
            .purchase_transactions(
                account,
                &PurchaseQuery {
                    ingredient_ids: vec![ingredient_id],
                    since: None,
                    limit: None,
                },
            )
            .await?;

        weighted_average(purchases.iter())
    }

    /// Running WAC after each purchase within the last `days`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the purchase read fails or the arithmetic is not
    /// representable.
    #[instrument(skip_all, fields(account = %account, ingredient = %ingredient_id))]
    pub async fn wac_history(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<WacPoint>> {
        let mut purchases = self
            .store
            .purchase_transactions(
                account,
                &PurchaseQuery {
                    ingredient_ids: vec![ingredient_id],
                    since: Some(now - Duration::days(days)),
                    limit: None,
                },
            )
            .await?;
        purchases.reverse();

        let mut total_quantity = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        let mut points = Vec::with_capacity(purchases.len());

        for purchase in &purchases {
            total_quantity = money::add(total_quantity, purchase.quantity)?;
            total_value = money::add(total_value, purchase.value())?;
            if total_quantity.is_zero() {
                continue;
            }
            points.push(WacPoint {
                at: purchase.created_at,
                quantity: purchase.quantity,
                value: purchase.value(),
                running_wac: money::div(total_value, total_quantity)?,
            });
        }

        Ok(points)
    }
}

/// `sum(value) / sum(quantity)`, or `None` when the quantity sum is zero.
fn weighted_average<'t>(
    purchases: impl Iterator<Item = &'t StockTransaction>,
) -> Result<Option<Decimal>> {
    let mut quantity = Decimal::ZERO;
    let mut value = Decimal::ZERO;
    for purchase in purchases {
        quantity = money::add(quantity, purchase.quantity)?;
        value = money::add(value, purchase.value())?;
    }

    if quantity.is_zero() {
        return Ok(None);
    }
    money::div(value, quantity).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn line(ingredient_id: IngredientId, quantity: i64, price: i64) -> WacLine {
        WacLine {
            ingredient_id,
            quantity: Decimal::from(quantity),
            current_price: Decimal::from(price),
        }
    }

    #[tokio::test]
    async fn test_zero_without_purchases() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let flour = store.add_ingredient(account, "Tepung", "kg", Decimal::from(1000));

        let config = CostingConfig::default();
        let adjustment = WacCalculator::new(&store, &config)
            .adjustment(account, &[line(flour, 2, 1000)], Decimal::from(10), Utc::now())
            .await
            .unwrap();

        assert_eq!(adjustment.per_unit, Decimal::ZERO);
        assert!(adjustment.deltas.is_empty());
    }

    #[tokio::test]
    async fn test_contribution_from_recent_purchases() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let sugar = store.add_ingredient(account, "Gula", "kg", Decimal::from(1000));
        let now = Utc::now();
        store.add_purchase(account, sugar, Decimal::from(10), Decimal::from(1100), now - Duration::days(5));
        store.add_purchase(account, sugar, Decimal::from(10), Decimal::from(1300), now - Duration::days(2));

        let config = CostingConfig::default();
        let adjustment = WacCalculator::new(&store, &config)
            .adjustment(account, &[line(sugar, 5, 1000)], Decimal::from(10), now)
            .await
            .unwrap();

        // wac 1200, delta 200, 5 / 10 per unit
        assert_eq!(adjustment.per_unit, Decimal::from(100));
        assert_eq!(adjustment.deltas[0].wac, Decimal::from(1200));
    }

    #[tokio::test]
    async fn test_repeated_ingredient_lines_are_combined() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let sugar = store.add_ingredient(account, "Gula", "kg", Decimal::from(1000));
        let now = Utc::now();
        store.add_purchase(account, sugar, Decimal::from(10), Decimal::from(1200), now - Duration::days(1));

        let config = CostingConfig::default();
        let adjustment = WacCalculator::new(&store, &config)
            .adjustment(
                account,
                &[line(sugar, 2, 1000), line(sugar, 3, 1000)],
                Decimal::from(10),
                now,
            )
            .await
            .unwrap();

        // One delta for 5 kg: 200 * 5 / 10
        assert_eq!(adjustment.deltas.len(), 1);
        assert_eq!(adjustment.deltas[0].ingredient_id, sugar);
        assert_eq!(adjustment.per_unit, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_difference_below_tolerance_is_ignored() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let salt = store.add_ingredient(account, "Garam", "kg", Decimal::from(500));
        let now = Utc::now();
        store.add_purchase(account, salt, Decimal::from(4), Decimal::new(500_005, 3), now);

        let config = CostingConfig::default();
        let adjustment = WacCalculator::new(&store, &config)
            .adjustment(account, &[line(salt, 1, 500)], Decimal::ONE, now)
            .await
            .unwrap();

        assert_eq!(adjustment.per_unit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_purchases_outside_lookback_are_ignored() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let oil = store.add_ingredient(account, "Minyak", "l", Decimal::from(15_000));
        let now = Utc::now();
        store.add_purchase(account, oil, Decimal::from(10), Decimal::from(20_000), now - Duration::days(120));

        let config = CostingConfig::default();
        let adjustment = WacCalculator::new(&store, &config)
            .adjustment(account, &[line(oil, 1, 15_000)], Decimal::ONE, now)
            .await
            .unwrap();

        assert_eq!(adjustment.per_unit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_wac_history_is_running_and_oldest_first() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let egg = store.add_ingredient(account, "Telur", "butir", Decimal::from(2000));
        let now = Utc::now();
        store.add_purchase(account, egg, Decimal::from(10), Decimal::from(1800), now - Duration::days(3));
        store.add_purchase(account, egg, Decimal::from(30), Decimal::from(2200), now - Duration::days(1));

        let config = CostingConfig::default();
        let calculator = WacCalculator::new(&store, &config);
        let history = calculator.wac_history(account, egg, 30, now).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].running_wac, Decimal::from(1800));
        assert_eq!(history[1].running_wac, Decimal::from(2100));

        let full = calculator.ingredient_wac(account, egg).await.unwrap();
        assert_eq!(full, Some(Decimal::from(2100)));
    }
}
