//! Data store contracts and implementations.
//!
//! # Tables (schema `hpp`)
//!
//! - `recipes`, `ingredients`, `recipe_ingredients` - recipe graph (read, plus
//!   the cached `recipes.cost_per_unit`)
//! - `productions` - production batches (read-only)
//! - `operational_costs` - overhead and labor cost lines (read-only)
//! - `stock_transactions` - purchases and other stock movements (read-only)
//! - `hpp_calculations` - append-only calculation snapshots
//! - `recalculation_queue` - recalculation work items
//!
//! Every query is scoped by account.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/engine/migrations/` and run via:
//! ```bash
//! cargo run -p hpp-cli -- migrate
//! ```

pub mod calculations;
pub mod cost_inputs;
pub mod memory;
pub mod pg_store;
pub mod recalculation_queue;
pub mod recipes;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use hpp_core::{AccountId, IngredientId, QueueItemId, RecipeId};

use crate::models::{
    HppCalculation, Ingredient, NewHppCalculation, NewQueueItem, OperationalCost, Production,
    ProductionQuery, PurchaseQuery, QueueCounts, RecalculationQueueItem, Recipe,
    RecipeWithIngredients, StockTransaction,
};

pub use calculations::HppCalculationRepository;
pub use cost_inputs::CostInputRepository;
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use recipes::RecipeRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Read/write contract for the cost inputs and calculation snapshots.
#[async_trait]
pub trait CostStore: Send + Sync {
    /// Get a recipe by ID.
    async fn get_recipe(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<Recipe>, RepositoryError>;

    /// Get a recipe with its ingredient lines and each line's ingredient.
    async fn get_recipe_with_ingredients(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<RecipeWithIngredients>, RepositoryError>;

    /// List all active recipes.
    async fn list_active_recipes(&self, account: AccountId)
    -> Result<Vec<Recipe>, RepositoryError>;

    /// Get an ingredient by ID.
    async fn get_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Option<Ingredient>, RepositoryError>;

    /// Distinct recipes (active or not) with at least one line referencing
    /// the ingredient.
    async fn recipes_using_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Vec<Recipe>, RepositoryError>;

    /// Completed production batches, newest first.
    async fn completed_productions(
        &self,
        account: AccountId,
        query: &ProductionQuery,
    ) -> Result<Vec<Production>, RepositoryError>;

    /// All active operational costs.
    async fn active_operational_costs(
        &self,
        account: AccountId,
    ) -> Result<Vec<OperationalCost>, RepositoryError>;

    /// `PURCHASE` stock transactions, newest first.
    async fn purchase_transactions(
        &self,
        account: AccountId,
        query: &PurchaseQuery,
    ) -> Result<Vec<StockTransaction>, RepositoryError>;

    /// Insert a calculation snapshot and update the recipe's cached
    /// `cost_per_unit` in one unit of work.
    ///
    /// Returns `RepositoryError::NotFound` (and writes nothing) if the recipe
    /// does not exist in the account.
    async fn record_calculation(
        &self,
        account: AccountId,
        calculation: &NewHppCalculation,
    ) -> Result<HppCalculation, RepositoryError>;

    /// Most recent calculation for a recipe by creation time.
    async fn latest_calculation(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<HppCalculation>, RepositoryError>;

    /// Calculation history for a recipe, newest first.
    async fn calculation_history(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        limit: i64,
    ) -> Result<Vec<HppCalculation>, RepositoryError>;
}

/// Read/write contract for the recalculation queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new pending item.
    async fn enqueue(
        &self,
        account: AccountId,
        item: &NewQueueItem,
    ) -> Result<RecalculationQueueItem, RepositoryError>;

    /// Pending items, oldest first.
    async fn pending_items(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError>;

    /// Move a pending item to `processing`.
    ///
    /// Returns `false` if the item was no longer pending.
    async fn mark_processing(
        &self,
        account: AccountId,
        id: QueueItemId,
    ) -> Result<bool, RepositoryError>;

    /// Move a processing item to `completed` and stamp `processed_at`.
    async fn mark_completed(&self, account: AccountId, id: QueueItemId)
    -> Result<(), RepositoryError>;

    /// Move a processing item to `failed`, stamping `processed_at` and the
    /// error message.
    async fn mark_failed(
        &self,
        account: AccountId,
        id: QueueItemId,
        error_message: &str,
    ) -> Result<(), RepositoryError>;

    /// Item counts per status.
    async fn queue_counts(&self, account: AccountId) -> Result<QueueCounts, RepositoryError>;

    /// Most recently processed failed items.
    async fn recent_failures(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError>;

    /// Delete completed and failed items created before `cutoff`.
    ///
    /// Returns the number of deleted items.
    async fn delete_finished_before(
        &self,
        account: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
