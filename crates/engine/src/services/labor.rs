//! Labor cost estimation.
//!
//! Tiers are tried in [`LaborTier::CHAIN`] order and the first one with
//! usable data wins:
//!
//! 1. [`LaborTier::RecipeHistory`] - completed batches of the recipe
//! 2. [`LaborTier::AccountHistory`] - completed batches across the account
//! 3. [`LaborTier::OperationalCosts`] - labor operational costs over recent volume
//! 4. [`LaborTier::Default`] - configured constant

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hpp_core::{AccountId, RecipeId};

use crate::config::CostingConfig;
use crate::db::CostStore;
use crate::error::Result;
use crate::models::{Production, ProductionQuery};
use crate::money;

/// Source of a labor estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaborTier {
    RecipeHistory,
    AccountHistory,
    OperationalCosts,
    Default,
}

impl LaborTier {
    /// Evaluation order.
    pub const CHAIN: [Self; 4] = [
        Self::RecipeHistory,
        Self::AccountHistory,
        Self::OperationalCosts,
        Self::Default,
    ];

    /// Stable identifier used in logs and notes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecipeHistory => "recipe_history",
            Self::AccountHistory => "account_history",
            Self::OperationalCosts => "operational_costs",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for LaborTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-unit labor cost and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaborEstimate {
    pub per_unit: Decimal,
    pub source: LaborTier,
}

/// Estimates per-unit labor cost for a recipe.
pub struct LaborEstimator<'a, S> {
    store: &'a S,
    config: &'a CostingConfig,
}

impl<'a, S: CostStore> LaborEstimator<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, config: &'a CostingConfig) -> Self {
        Self { store, config }
    }

    /// Walk the tier chain and return the first usable estimate.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails or the arithmetic overflows.
    #[instrument(skip_all, fields(account = %account, recipe = %recipe_id))]
    pub async fn estimate(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        now: DateTime<Utc>,
    ) -> Result<LaborEstimate> {
        for tier in LaborTier::CHAIN {
            if let Some(per_unit) = self.try_tier(tier, account, recipe_id, now).await? {
                debug!(tier = %tier, per_unit = %per_unit, "Labor tier selected");
                return Ok(LaborEstimate { per_unit, source: tier });
            }
            debug!(tier = %tier, "Labor tier has no usable data");
        }

        // The default tier always yields a value.
        Ok(LaborEstimate {
            per_unit: self.config.default_labor_per_unit,
            source: LaborTier::Default,
        })
    }

    async fn try_tier(
        &self,
        tier: LaborTier,
        account: AccountId,
        recipe_id: RecipeId,
        now: DateTime<Utc>,
    ) -> Result<Option<Decimal>> {
        match tier {
            LaborTier::RecipeHistory => {
                let productions = self
                    .store
                    .completed_productions(
                        account,
                        &ProductionQuery {
                            recipe_id: Some(recipe_id),
                            since: None,
                            limit: Some(self.config.recipe_labor_sample),
                        },
                    )
                    .await?;
                labor_ratio(&productions)
            }
            LaborTier::AccountHistory => {
                let productions = self
                    .store
                    .completed_productions(
                        account,
                        &ProductionQuery {
                            recipe_id: None,
                            since: None,
                            limit: Some(self.config.account_labor_sample),
                        },
                    )
                    .await?;
                labor_ratio(&productions)
            }
            LaborTier::OperationalCosts => self.operational_labor_rate(account, now).await,
            LaborTier::Default => Ok(Some(self.config.default_labor_per_unit)),
        }
    }

    async fn operational_labor_rate(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Decimal>> {
        let window = ProductionQuery {
            recipe_id: None,
            since: Some(now - Duration::days(self.config.production_window_days)),
            limit: None,
        };
        let (costs, productions) = tokio::try_join!(
            self.store.active_operational_costs(account),
            self.store.completed_productions(account, &window),
        )?;

        let labor_total = money::sum(
            costs
                .iter()
                .filter(|c| c.is_labor(&self.config.labor_keywords))
                .map(|c| c.amount),
        )?;
        let volume = money::sum(productions.iter().map(Production::quantity))?;

        if labor_total <= Decimal::ZERO || volume <= Decimal::ZERO {
            return Ok(None);
        }
        money::div(labor_total, volume).map(Some)
    }
}

/// `sum(labor_cost) / sum(quantity)` when both sums are positive.
fn labor_ratio(productions: &[Production]) -> Result<Option<Decimal>> {
    let labor = money::sum(productions.iter().map(|p| p.labor_cost))?;
    let quantity = money::sum(productions.iter().map(Production::quantity))?;

    if labor <= Decimal::ZERO || quantity <= Decimal::ZERO {
        return Ok(None);
    }
    money::div(labor, quantity).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn setup() -> (MemoryStore, AccountId, RecipeId) {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Nasi Uduk", 10);
        (store, account, recipe_id)
    }

    #[tokio::test]
    async fn test_recipe_history_tier_wins() {
        let (store, account, recipe_id) = setup();
        let now = Utc::now();
        store.add_completed_production(account, recipe_id, Decimal::from(10), Decimal::from(300), now);
        store.add_completed_production(account, recipe_id, Decimal::from(30), Decimal::from(900), now);

        let config = CostingConfig::default();
        let estimate = LaborEstimator::new(&store, &config)
            .estimate(account, recipe_id, now)
            .await
            .unwrap();

        assert_eq!(estimate.source, LaborTier::RecipeHistory);
        assert_eq!(estimate.per_unit, Decimal::from(30));
    }

    #[tokio::test]
    async fn test_falls_back_to_account_history() {
        let (store, account, recipe_id) = setup();
        let other = store.add_recipe(account, "Lontong", 5);
        let now = Utc::now();
        store.add_completed_production(account, other, Decimal::from(20), Decimal::from(1000), now);

        let config = CostingConfig::default();
        let estimate = LaborEstimator::new(&store, &config)
            .estimate(account, recipe_id, now)
            .await
            .unwrap();

        assert_eq!(estimate.source, LaborTier::AccountHistory);
        assert_eq!(estimate.per_unit, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_zero_labor_history_falls_through_to_operational_costs() {
        let (store, account, recipe_id) = setup();
        let now = Utc::now();
        store.add_completed_production(
            account,
            recipe_id,
            Decimal::from(40),
            Decimal::ZERO,
            now - Duration::days(3),
        );
        store.add_operational_cost(account, "Gaji Karyawan", Decimal::from(400_000));
        store.add_operational_cost(account, "Listrik", Decimal::from(150_000));

        let config = CostingConfig::default();
        let estimate = LaborEstimator::new(&store, &config)
            .estimate(account, recipe_id, now)
            .await
            .unwrap();

        assert_eq!(estimate.source, LaborTier::OperationalCosts);
        assert_eq!(estimate.per_unit, Decimal::from(10_000));
    }

    #[tokio::test]
    async fn test_default_when_no_data() {
        let (store, account, recipe_id) = setup();
        let config = CostingConfig::default();

        let estimate = LaborEstimator::new(&store, &config)
            .estimate(account, recipe_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(estimate.source, LaborTier::Default);
        assert_eq!(estimate.per_unit, Decimal::from(5000));
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(LaborTier::CHAIN[0], LaborTier::RecipeHistory);
        assert_eq!(LaborTier::CHAIN[3], LaborTier::Default);
    }
}
