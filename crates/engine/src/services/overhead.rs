//! Overhead allocation.
//!
//! Non-labor operational costs are spread over recent production volume. A
//! recipe without recent volume falls back to the configured
//! [`NewRecipeOverhead`] strategy.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hpp_core::{AccountId, RecipeId};

use crate::config::{CostingConfig, NewRecipeOverhead};
use crate::db::CostStore;
use crate::error::Result;
use crate::models::{Production, ProductionQuery};
use crate::money;

/// How an overhead value was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverheadMethod {
    /// No non-labor operational costs.
    None,
    /// Proportional to the recipe's share of recent volume.
    VolumeBased,
    /// Equal share per active recipe, per average serving.
    EqualShare,
    /// Configured default per serving.
    DefaultRate,
}

impl OverheadMethod {
    /// Stable identifier used in logs and notes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::VolumeBased => "volume_based",
            Self::EqualShare => "equal_share",
            Self::DefaultRate => "default_rate",
        }
    }
}

impl std::fmt::Display for OverheadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-unit overhead and how it was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverheadAllocation {
    pub per_unit: Decimal,
    pub method: OverheadMethod,
    /// Total non-labor overhead that was allocated from.
    pub total_overhead: Decimal,
}

pub struct OverheadAllocator<'a, S> {
    store: &'a S,
    config: &'a CostingConfig,
}

impl<'a, S: CostStore> OverheadAllocator<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, config: &'a CostingConfig) -> Self {
        Self { store, config }
    }

    /// Allocate per-unit overhead to a recipe.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails or the arithmetic is not
    /// representable.
    #[instrument(skip_all, fields(account = %account, recipe = %recipe_id))]
    pub async fn allocate(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        now: DateTime<Utc>,
    ) -> Result<OverheadAllocation> {
        let costs = self.store.active_operational_costs(account).await?;
        let total_overhead = money::sum(
            costs
                .iter()
                .filter(|c| !c.is_labor(&self.config.labor_keywords))
                .map(|c| c.amount),
        )?;

        if total_overhead <= Decimal::ZERO {
            debug!("No non-labor operational costs");
            return Ok(OverheadAllocation {
                per_unit: Decimal::ZERO,
                method: OverheadMethod::None,
                total_overhead: Decimal::ZERO,
            });
        }

        let since = Some(now - Duration::days(self.config.production_window_days));
        let recipe_query = ProductionQuery {
            recipe_id: Some(recipe_id),
            since,
            limit: None,
        };
        let account_query = ProductionQuery {
            recipe_id: None,
            since,
            limit: None,
        };
        let (recipe_batches, account_batches) = tokio::try_join!(
            self.store.completed_productions(account, &recipe_query),
            self.store.completed_productions(account, &account_query),
        )?;

        let recipe_volume = money::sum(recipe_batches.iter().map(Production::quantity))?;
        let total_volume = money::sum(account_batches.iter().map(Production::quantity))?;

        if recipe_volume > Decimal::ZERO && total_volume > Decimal::ZERO {
            let allocated = money::div(money::mul(total_overhead, recipe_volume)?, total_volume)?;
            let per_unit = money::div(allocated, recipe_volume)?;
            debug!(
                recipe_volume = %recipe_volume,
                total_volume = %total_volume,
                per_unit = %per_unit,
                "Volume-based overhead"
            );
            return Ok(OverheadAllocation {
                per_unit,
                method: OverheadMethod::VolumeBased,
                total_overhead,
            });
        }

        match self.config.new_recipe_overhead {
            NewRecipeOverhead::EqualShare => self.equal_share(account, total_overhead).await,
            NewRecipeOverhead::DefaultRate => Ok(self.default_rate(total_overhead)),
        }
    }

    async fn equal_share(
        &self,
        account: AccountId,
        total_overhead: Decimal,
    ) -> Result<OverheadAllocation> {
        let recipes = self.store.list_active_recipes(account).await?;
        if recipes.is_empty() {
            debug!("No active recipes, using default overhead rate");
            return Ok(self.default_rate(total_overhead));
        }

        let count = Decimal::from(recipes.len());
        let total_servings = money::sum(recipes.iter().map(|r| Decimal::from(r.servings)))?;
        let average_servings = money::div(total_servings, count)?;
        if average_servings <= Decimal::ZERO {
            return Ok(self.default_rate(total_overhead));
        }

        let per_recipe = money::div(total_overhead, count)?;
        let per_unit = money::div(per_recipe, average_servings)?;
        debug!(
            active_recipes = recipes.len(),
            average_servings = %average_servings,
            per_unit = %per_unit,
            "Equal-share overhead"
        );

        Ok(OverheadAllocation {
            per_unit,
            method: OverheadMethod::EqualShare,
            total_overhead,
        })
    }

    const fn default_rate(&self, total_overhead: Decimal) -> OverheadAllocation {
        OverheadAllocation {
            per_unit: self.config.default_overhead_per_serving,
            method: OverheadMethod::DefaultRate,
            total_overhead,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_zero_overhead_without_non_labor_costs() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Pecel", 4);
        store.add_operational_cost(account, "Tenaga Kerja Harian", Decimal::from(100_000));

        let config = CostingConfig::default();
        let allocation = OverheadAllocator::new(&store, &config)
            .allocate(account, recipe_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(allocation.method, OverheadMethod::None);
        assert_eq!(allocation.per_unit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_volume_based_allocation() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Rendang", 10);
        let other = store.add_recipe(account, "Gulai", 10);
        let now = Utc::now();
        store.add_operational_cost(account, "Sewa", Decimal::from(600));
        store.add_completed_production(account, recipe_id, Decimal::from(10), Decimal::ZERO, now - Duration::days(1));
        store.add_completed_production(account, other, Decimal::from(20), Decimal::ZERO, now - Duration::days(2));
        // Outside the window.
        store.add_completed_production(account, other, Decimal::from(500), Decimal::ZERO, now - Duration::days(45));

        let config = CostingConfig::default();
        let allocation = OverheadAllocator::new(&store, &config)
            .allocate(account, recipe_id, now)
            .await
            .unwrap();

        assert_eq!(allocation.method, OverheadMethod::VolumeBased);
        assert_eq!(allocation.per_unit, Decimal::from(20));
    }

    #[tokio::test]
    async fn test_equal_share_for_recipe_without_volume() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Klepon", 20);
        store.add_recipe(account, "Onde-onde", 10);
        store.add_operational_cost(account, "Listrik", Decimal::from(3000));

        let config = CostingConfig::default();
        let allocation = OverheadAllocator::new(&store, &config)
            .allocate(account, recipe_id, Utc::now())
            .await
            .unwrap();

        // 3000 / 2 recipes / 15 average servings
        assert_eq!(allocation.method, OverheadMethod::EqualShare);
        assert_eq!(allocation.per_unit, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_default_rate_strategy() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Lemper", 8);
        store.add_operational_cost(account, "Gas", Decimal::from(50_000));

        let config = CostingConfig {
            new_recipe_overhead: NewRecipeOverhead::DefaultRate,
            ..CostingConfig::default()
        };
        let allocation = OverheadAllocator::new(&store, &config)
            .allocate(account, recipe_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(allocation.method, OverheadMethod::DefaultRate);
        assert_eq!(allocation.per_unit, Decimal::from(2000));
    }

    #[tokio::test]
    async fn test_no_active_recipes_uses_default_rate() {
        let store = MemoryStore::new();
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Arsip", 8);
        store.set_recipe_active(recipe_id, false);
        store.add_operational_cost(account, "Sewa", Decimal::from(50_000));

        let config = CostingConfig::default();
        let allocation = OverheadAllocator::new(&store, &config)
            .allocate(account, recipe_id, Utc::now())
            .await
            .unwrap();

        assert_eq!(allocation.method, OverheadMethod::DefaultRate);
    }
}
