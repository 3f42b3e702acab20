//! `PostgreSQL`-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use hpp_core::{AccountId, IngredientId, QueueItemId, RecipeId};

use super::calculations::HppCalculationRepository;
use super::cost_inputs::CostInputRepository;
use super::recipes::RecipeRepository;
use super::{CostStore, QueueStore, RepositoryError, recalculation_queue};
use crate::models::{
    HppCalculation, Ingredient, NewHppCalculation, NewQueueItem, OperationalCost, Production,
    ProductionQuery, PurchaseQuery, QueueCounts, RecalculationQueueItem, Recipe,
    RecipeWithIngredients, StockTransaction,
};

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CostStore for PgStore {
    async fn get_recipe(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<Recipe>, RepositoryError> {
        RecipeRepository::new(&self.pool)
            .get_recipe(account, recipe_id)
            .await
    }

    async fn get_recipe_with_ingredients(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<RecipeWithIngredients>, RepositoryError> {
        RecipeRepository::new(&self.pool)
            .get_recipe_with_ingredients(account, recipe_id)
            .await
    }

    async fn list_active_recipes(
        &self,
        account: AccountId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        RecipeRepository::new(&self.pool)
            .list_active_recipes(account)
            .await
    }

    async fn get_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Option<Ingredient>, RepositoryError> {
        RecipeRepository::new(&self.pool)
            .get_ingredient(account, ingredient_id)
            .await
    }

    async fn recipes_using_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        RecipeRepository::new(&self.pool)
            .recipes_using_ingredient(account, ingredient_id)
            .await
    }

    async fn completed_productions(
        &self,
        account: AccountId,
        query: &ProductionQuery,
    ) -> Result<Vec<Production>, RepositoryError> {
        CostInputRepository::new(&self.pool)
            .completed_productions(account, query)
            .await
    }

    async fn active_operational_costs(
        &self,
        account: AccountId,
    ) -> Result<Vec<OperationalCost>, RepositoryError> {
        CostInputRepository::new(&self.pool)
            .active_operational_costs(account)
            .await
    }

    async fn purchase_transactions(
        &self,
        account: AccountId,
        query: &PurchaseQuery,
    ) -> Result<Vec<StockTransaction>, RepositoryError> {
        CostInputRepository::new(&self.pool)
            .purchase_transactions(account, query)
            .await
    }

    async fn record_calculation(
        &self,
        account: AccountId,
        calculation: &NewHppCalculation,
    ) -> Result<HppCalculation, RepositoryError> {
        HppCalculationRepository::new(&self.pool)
            .record(account, calculation)
            .await
    }

    async fn latest_calculation(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<HppCalculation>, RepositoryError> {
        HppCalculationRepository::new(&self.pool)
            .latest(account, recipe_id)
            .await
    }

    async fn calculation_history(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        limit: i64,
    ) -> Result<Vec<HppCalculation>, RepositoryError> {
        HppCalculationRepository::new(&self.pool)
            .history(account, recipe_id, limit)
            .await
    }
}

#[async_trait]
impl QueueStore for PgStore {
    async fn enqueue(
        &self,
        account: AccountId,
        item: &NewQueueItem,
    ) -> Result<RecalculationQueueItem, RepositoryError> {
        recalculation_queue::enqueue(&self.pool, account, item).await
    }

    async fn pending_items(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
        recalculation_queue::pending_items(&self.pool, account, limit).await
    }

    async fn mark_processing(
        &self,
        account: AccountId,
        id: QueueItemId,
    ) -> Result<bool, RepositoryError> {
        recalculation_queue::mark_processing(&self.pool, account, id).await
    }

    async fn mark_completed(
        &self,
        account: AccountId,
        id: QueueItemId,
    ) -> Result<(), RepositoryError> {
        recalculation_queue::mark_completed(&self.pool, account, id).await
    }

    async fn mark_failed(
        &self,
        account: AccountId,
        id: QueueItemId,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        recalculation_queue::mark_failed(&self.pool, account, id, error_message).await
    }

    async fn queue_counts(&self, account: AccountId) -> Result<QueueCounts, RepositoryError> {
        recalculation_queue::queue_counts(&self.pool, account).await
    }

    async fn recent_failures(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
        recalculation_queue::recent_failures(&self.pool, account, limit).await
    }

    async fn delete_finished_before(
        &self,
        account: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        recalculation_queue::delete_finished_before(&self.pool, account, cutoff).await
    }
}
