//! Stale HPP detection.
//!
//! A recipe is stale when it is active and its latest snapshot is missing or
//! older than the freshness window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use hpp_core::{AccountId, RecipeId};

use super::calculator::{BatchOutcome, HppCalculator};
use crate::db::CostStore;
use crate::error::{HppError, Result};

/// An active recipe whose cost is out of date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleRecipe {
    pub recipe_id: RecipeId,
    pub name: String,
    /// Creation time of the latest snapshot; `None` if never calculated.
    pub last_calculated_at: Option<DateTime<Utc>>,
}

pub struct StalenessAuditor<S> {
    store: Arc<S>,
    calculator: HppCalculator<S>,
}

impl<S: CostStore> StalenessAuditor<S> {
    #[must_use]
    pub const fn new(store: Arc<S>, calculator: HppCalculator<S>) -> Self {
        Self { store, calculator }
    }

    /// Active recipes with no snapshot, or whose latest snapshot is older
    /// than `stale_days`.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Validation` for a negative window, or
    /// `HppError::Repository` if the store fails.
    #[instrument(skip_all, fields(account = %account, stale_days = stale_days))]
    pub async fn check_stale_hpp(&self, account: AccountId, stale_days: i64) -> Result<Vec<StaleRecipe>> {
        if stale_days < 0 {
            return Err(HppError::Validation(format!(
                "stale window must not be negative, got {stale_days} days"
            )));
        }

        let cutoff = Utc::now() - Duration::days(stale_days);
        let recipes = self.store.list_active_recipes(account).await?;

        let mut stale = Vec::new();
        for recipe in recipes {
            let latest = self.store.latest_calculation(account, recipe.id).await?;
            let last_calculated_at = latest.map(|c| c.created_at);
            if last_calculated_at.is_none_or(|at| at < cutoff) {
                stale.push(StaleRecipe {
                    recipe_id: recipe.id,
                    name: recipe.name,
                    last_calculated_at,
                });
            }
        }

        info!(stale = stale.len(), "Stale HPP check finished");
        Ok(stale)
    }

    /// Recalculate every stale recipe. One failure does not stop the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only if finding the stale recipes fails.
    #[instrument(skip_all, fields(account = %account, stale_days = stale_days))]
    pub async fn refresh_stale_hpp(&self, account: AccountId, stale_days: i64) -> Result<BatchOutcome> {
        let recipe_ids: Vec<RecipeId> = self
            .check_stale_hpp(account, stale_days)
            .await?
            .into_iter()
            .map(|s| s.recipe_id)
            .collect();

        let outcome = self.calculator.recalculate_many(account, &recipe_ids).await;
        info!(
            refreshed = outcome.processed,
            failed = outcome.failed,
            "Stale HPP refresh finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use hpp_core::HppCalculationId;

    use super::*;
    use crate::config::CostingConfig;
    use crate::db::MemoryStore;
    use crate::models::HppCalculation;

    fn auditor(store: &Arc<MemoryStore>) -> StalenessAuditor<MemoryStore> {
        let calculator = HppCalculator::new(Arc::clone(store), Arc::new(CostingConfig::default()));
        StalenessAuditor::new(Arc::clone(store), calculator)
    }

    fn snapshot_at(account: AccountId, recipe_id: RecipeId, created_at: DateTime<Utc>) -> HppCalculation {
        HppCalculation {
            id: HppCalculationId::generate(),
            account_id: account,
            recipe_id,
            calculation_date: created_at.date_naive(),
            material_cost: Decimal::from(1000),
            labor_cost: Decimal::ZERO,
            overhead_cost: Decimal::ZERO,
            wac_adjustment: Decimal::ZERO,
            total_hpp: Decimal::from(1000),
            cost_per_unit: Decimal::from(1000),
            production_quantity: 1,
            material_breakdown: Vec::new(),
            notes: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_missing_and_old_snapshots_are_stale() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let never = store.add_recipe(account, "Baru", 1);
        let old = store.add_recipe(account, "Lama", 1);
        let fresh = store.add_recipe(account, "Segar", 1);
        let inactive = store.add_recipe(account, "Arsip", 1);
        store.set_recipe_active(inactive, false);

        let now = Utc::now();
        store.insert_calculation(snapshot_at(account, old, now - Duration::days(10)));
        store.insert_calculation(snapshot_at(account, fresh, now - Duration::days(1)));

        let stale = auditor(&store).check_stale_hpp(account, 7).await.unwrap();
        let ids: Vec<RecipeId> = stale.iter().map(|s| s.recipe_id).collect();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&never));
        assert!(ids.contains(&old));
        let never_entry = stale.iter().find(|s| s.recipe_id == never).unwrap();
        assert!(never_entry.last_calculated_at.is_none());
    }

    #[tokio::test]
    async fn test_newer_snapshot_supersedes_old_one() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Soto", 1);
        let now = Utc::now();
        store.insert_calculation(snapshot_at(account, recipe_id, now - Duration::days(30)));
        store.insert_calculation(snapshot_at(account, recipe_id, now - Duration::hours(2)));

        assert!(auditor(&store).check_stale_hpp(account, 7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_recalculates_stale_recipes() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let rice = store.add_ingredient(account, "Beras", "kg", Decimal::from(14_000));
        let good = store.add_recipe(account, "Nasi", 4);
        store.add_recipe_line(account, good, rice, Decimal::ONE, "kg");
        let broken = store.add_recipe(account, "Rusak", 0);

        let auditor = auditor(&store);
        let outcome = auditor.refresh_stale_hpp(account, 7).await.unwrap();

        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors[0].recipe_id, broken);

        let remaining = auditor.check_stale_hpp(account, 7).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].recipe_id, broken);
    }
}
