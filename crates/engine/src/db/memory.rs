//! In-memory store.
//!
//! Backs unit and integration tests and local dry runs. Behaves like
//! [`PgStore`](super::PgStore) for ordering, account scoping and the
//! recipe cache update on [`CostStore::record_calculation`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use hpp_core::{
    AccountId, HppCalculationId, IngredientId, OperationalCostId, ProductionId, ProductionStatus,
    QueueItemId, QueueItemStatus, RecipeId, StockTransactionId, TransactionType,
};

use super::{CostStore, QueueStore, RepositoryError};
use crate::models::{
    HppCalculation, Ingredient, NewHppCalculation, NewQueueItem, OperationalCost, Production,
    ProductionQuery, PurchaseQuery, QueueCounts, RecalculationQueueItem, Recipe, RecipeIngredient,
    RecipeWithIngredients, StockTransaction,
};

#[derive(Debug, Clone)]
struct StoredLine {
    account_id: AccountId,
    line: RecipeIngredient,
}

#[derive(Debug, Default)]
struct MemoryState {
    recipes: Vec<Recipe>,
    ingredients: Vec<Ingredient>,
    lines: Vec<StoredLine>,
    productions: Vec<Production>,
    operational_costs: Vec<OperationalCost>,
    transactions: Vec<StockTransaction>,
    calculations: Vec<HppCalculation>,
    queue: Vec<RecalculationQueueItem>,
}

/// Store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add an active recipe and return its ID.
    pub fn add_recipe(&self, account: AccountId, name: &str, servings: i32) -> RecipeId {
        let now = Utc::now();
        let recipe = Recipe {
            id: RecipeId::generate(),
            account_id: account,
            name: name.to_owned(),
            servings,
            is_active: true,
            cost_per_unit: None,
            selling_price: None,
            created_at: now,
            updated_at: now,
        };
        let id = recipe.id;
        self.insert_recipe(recipe);
        id
    }

    /// Insert a fully specified recipe.
    pub fn insert_recipe(&self, recipe: Recipe) {
        self.state().recipes.push(recipe);
    }

    /// Set a recipe's selling price.
    pub fn set_selling_price(&self, recipe_id: RecipeId, price: Option<Decimal>) {
        if let Some(recipe) = self.state().recipes.iter_mut().find(|r| r.id == recipe_id) {
            recipe.selling_price = price;
        }
    }

    /// Activate or deactivate a recipe.
    pub fn set_recipe_active(&self, recipe_id: RecipeId, is_active: bool) {
        if let Some(recipe) = self.state().recipes.iter_mut().find(|r| r.id == recipe_id) {
            recipe.is_active = is_active;
        }
    }

    /// Change a recipe's servings.
    pub fn set_servings(&self, recipe_id: RecipeId, servings: i32) {
        if let Some(recipe) = self.state().recipes.iter_mut().find(|r| r.id == recipe_id) {
            recipe.servings = servings;
        }
    }

    /// Remove a recipe and its lines.
    pub fn remove_recipe(&self, recipe_id: RecipeId) {
        let mut state = self.state();
        state.recipes.retain(|r| r.id != recipe_id);
        state.lines.retain(|l| l.line.recipe_id != recipe_id);
    }

    /// Add an ingredient and return its ID.
    pub fn add_ingredient(
        &self,
        account: AccountId,
        name: &str,
        unit: &str,
        price_per_unit: Decimal,
    ) -> IngredientId {
        let ingredient = Ingredient {
            id: IngredientId::generate(),
            account_id: account,
            name: name.to_owned(),
            unit: unit.to_owned(),
            price_per_unit,
            weighted_average_cost: None,
        };
        let id = ingredient.id;
        self.state().ingredients.push(ingredient);
        id
    }

    /// Change an ingredient's current price.
    pub fn set_ingredient_price(&self, ingredient_id: IngredientId, price_per_unit: Decimal) {
        if let Some(ingredient) = self
            .state()
            .ingredients
            .iter_mut()
            .find(|i| i.id == ingredient_id)
        {
            ingredient.price_per_unit = price_per_unit;
        }
    }

    /// Remove an ingredient, leaving any recipe lines that reference it.
    pub fn remove_ingredient(&self, ingredient_id: IngredientId) {
        self.state().ingredients.retain(|i| i.id != ingredient_id);
    }

    /// Add a recipe line.
    pub fn add_recipe_line(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        ingredient_id: IngredientId,
        quantity: Decimal,
        unit: &str,
    ) {
        self.insert_recipe_line(
            account,
            RecipeIngredient {
                recipe_id,
                ingredient_id,
                quantity,
                unit: unit.to_owned(),
                ingredient: None,
            },
        );
    }

    /// Insert a raw recipe line. The `ingredient` field is ignored and
    /// resolved on read.
    pub fn insert_recipe_line(&self, account: AccountId, line: RecipeIngredient) {
        self.state().lines.push(StoredLine {
            account_id: account,
            line: RecipeIngredient {
                ingredient: None,
                ..line
            },
        });
    }

    /// Remove every line of a recipe.
    pub fn clear_recipe_lines(&self, recipe_id: RecipeId) {
        self.state().lines.retain(|l| l.line.recipe_id != recipe_id);
    }

    /// Add a completed production batch.
    pub fn add_completed_production(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        quantity: Decimal,
        labor_cost: Decimal,
        completed_at: DateTime<Utc>,
    ) {
        self.insert_production(Production {
            id: ProductionId::generate(),
            account_id: account,
            recipe_id,
            status: ProductionStatus::Completed,
            actual_quantity: Some(quantity),
            labor_cost,
            completed_at: Some(completed_at),
            created_at: completed_at,
        });
    }

    /// Insert a fully specified production batch.
    pub fn insert_production(&self, production: Production) {
        self.state().productions.push(production);
    }

    /// Add an active operational cost.
    pub fn add_operational_cost(&self, account: AccountId, category: &str, amount: Decimal) {
        self.insert_operational_cost(OperationalCost {
            id: OperationalCostId::generate(),
            account_id: account,
            category: category.to_owned(),
            description: String::new(),
            amount,
            is_active: true,
        });
    }

    /// Insert a fully specified operational cost.
    pub fn insert_operational_cost(&self, cost: OperationalCost) {
        self.state().operational_costs.push(cost);
    }

    /// Add a purchase transaction with `total_price = quantity * unit_price`.
    pub fn add_purchase(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
        quantity: Decimal,
        unit_price: Decimal,
        at: DateTime<Utc>,
    ) {
        self.insert_transaction(StockTransaction {
            id: StockTransactionId::generate(),
            account_id: account,
            ingredient_id,
            transaction_type: TransactionType::Purchase,
            quantity,
            unit_price: Some(unit_price),
            total_price: Some(quantity * unit_price),
            created_at: at,
        });
    }

    /// Insert a fully specified stock transaction.
    pub fn insert_transaction(&self, transaction: StockTransaction) {
        self.state().transactions.push(transaction);
    }

    /// Insert a calculation snapshot as-is, without touching the recipe cache.
    pub fn insert_calculation(&self, calculation: HppCalculation) {
        self.state().calculations.push(calculation);
    }

    /// Insert a queue item as-is.
    pub fn insert_queue_item(&self, item: RecalculationQueueItem) {
        self.state().queue.push(item);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// All calculation snapshots of an account, in insertion order.
    #[must_use]
    pub fn calculations(&self, account: AccountId) -> Vec<HppCalculation> {
        self.state()
            .calculations
            .iter()
            .filter(|c| c.account_id == account)
            .cloned()
            .collect()
    }

    /// All queue items of an account, in insertion order.
    #[must_use]
    pub fn queue_items(&self, account: AccountId) -> Vec<RecalculationQueueItem> {
        self.state()
            .queue
            .iter()
            .filter(|q| q.account_id == account)
            .cloned()
            .collect()
    }

    fn transition(
        &self,
        account: AccountId,
        id: QueueItemId,
        next: QueueItemStatus,
        error_message: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let item = state
            .queue
            .iter_mut()
            .find(|q| q.id == id && q.account_id == account)
            .ok_or(RepositoryError::NotFound)?;

        if !item.status.can_transition_to(next) {
            return Ok(false);
        }

        item.status = next;
        if next.is_terminal() {
            item.processed_at = Some(Utc::now());
            item.error_message = error_message.map(str::to_owned);
        }
        Ok(true)
    }
}

fn ensure_transitioned(id: QueueItemId, moved: bool) -> Result<(), RepositoryError> {
    if moved {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "queue item {id} is not processing"
        )))
    }
}

#[async_trait]
impl CostStore for MemoryStore {
    async fn get_recipe(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<Recipe>, RepositoryError> {
        Ok(self
            .state()
            .recipes
            .iter()
            .find(|r| r.id == recipe_id && r.account_id == account)
            .cloned())
    }

    async fn get_recipe_with_ingredients(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<RecipeWithIngredients>, RepositoryError> {
        let state = self.state();
        let Some(recipe) = state
            .recipes
            .iter()
            .find(|r| r.id == recipe_id && r.account_id == account)
            .cloned()
        else {
            return Ok(None);
        };

        let ingredients = state
            .lines
            .iter()
            .filter(|l| l.account_id == account && l.line.recipe_id == recipe_id)
            .map(|l| RecipeIngredient {
                ingredient: state
                    .ingredients
                    .iter()
                    .find(|i| i.id == l.line.ingredient_id && i.account_id == account)
                    .cloned(),
                ..l.line.clone()
            })
            .collect();

        Ok(Some(RecipeWithIngredients {
            recipe,
            ingredients,
        }))
    }

    async fn list_active_recipes(
        &self,
        account: AccountId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        Ok(self
            .state()
            .recipes
            .iter()
            .filter(|r| r.account_id == account && r.is_active)
            .cloned()
            .collect())
    }

    async fn get_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Option<Ingredient>, RepositoryError> {
        Ok(self
            .state()
            .ingredients
            .iter()
            .find(|i| i.id == ingredient_id && i.account_id == account)
            .cloned())
    }

    async fn recipes_using_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        let state = self.state();
        Ok(state
            .recipes
            .iter()
            .filter(|r| r.account_id == account)
            .filter(|r| {
                state.lines.iter().any(|l| {
                    l.account_id == account
                        && l.line.recipe_id == r.id
                        && l.line.ingredient_id == ingredient_id
                })
            })
            .cloned()
            .collect())
    }

    async fn completed_productions(
        &self,
        account: AccountId,
        query: &ProductionQuery,
    ) -> Result<Vec<Production>, RepositoryError> {
        let mut productions: Vec<Production> = self
            .state()
            .productions
            .iter()
            .filter(|p| p.account_id == account && p.status == ProductionStatus::Completed)
            .filter(|p| query.recipe_id.is_none_or(|id| p.recipe_id == id))
            .filter(|p| query.since.is_none_or(|since| p.finished_at() >= since))
            .cloned()
            .collect();

        productions.sort_by(|a, b| b.finished_at().cmp(&a.finished_at()));
        if let Some(limit) = query.limit {
            productions.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(productions)
    }

    async fn active_operational_costs(
        &self,
        account: AccountId,
    ) -> Result<Vec<OperationalCost>, RepositoryError> {
        Ok(self
            .state()
            .operational_costs
            .iter()
            .filter(|c| c.account_id == account && c.is_active)
            .cloned()
            .collect())
    }

    async fn purchase_transactions(
        &self,
        account: AccountId,
        query: &PurchaseQuery,
    ) -> Result<Vec<StockTransaction>, RepositoryError> {
        let mut transactions: Vec<StockTransaction> = self
            .state()
            .transactions
            .iter()
            .filter(|t| {
                t.account_id == account
                    && t.transaction_type == TransactionType::Purchase
                    && query.ingredient_ids.contains(&t.ingredient_id)
            })
            .filter(|t| query.since.is_none_or(|since| t.created_at >= since))
            .cloned()
            .collect();

        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            transactions.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(transactions)
    }

    async fn record_calculation(
        &self,
        account: AccountId,
        calculation: &NewHppCalculation,
    ) -> Result<HppCalculation, RepositoryError> {
        let mut state = self.state();
        let now = Utc::now();

        let recipe = state
            .recipes
            .iter_mut()
            .find(|r| r.id == calculation.recipe_id && r.account_id == account)
            .ok_or(RepositoryError::NotFound)?;
        recipe.cost_per_unit = Some(calculation.cost_per_unit);
        recipe.updated_at = now;

        let stored = HppCalculation {
            id: HppCalculationId::generate(),
            account_id: account,
            recipe_id: calculation.recipe_id,
            calculation_date: calculation.calculation_date,
            material_cost: calculation.material_cost,
            labor_cost: calculation.labor_cost,
            overhead_cost: calculation.overhead_cost,
            wac_adjustment: calculation.wac_adjustment,
            total_hpp: calculation.total_hpp,
            cost_per_unit: calculation.cost_per_unit,
            production_quantity: calculation.production_quantity,
            material_breakdown: calculation.material_breakdown.clone(),
            notes: calculation.notes.clone(),
            created_at: now,
        };
        state.calculations.push(stored.clone());

        Ok(stored)
    }

    async fn latest_calculation(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<HppCalculation>, RepositoryError> {
        // max_by_key keeps the last of equal maxima, i.e. the newest insert.
        Ok(self
            .state()
            .calculations
            .iter()
            .filter(|c| c.account_id == account && c.recipe_id == recipe_id)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn calculation_history(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        limit: i64,
    ) -> Result<Vec<HppCalculation>, RepositoryError> {
        let mut history: Vec<HppCalculation> = self
            .state()
            .calculations
            .iter()
            .rev()
            .filter(|c| c.account_id == account && c.recipe_id == recipe_id)
            .cloned()
            .collect();

        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(history)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(
        &self,
        account: AccountId,
        item: &NewQueueItem,
    ) -> Result<RecalculationQueueItem, RepositoryError> {
        let stored = RecalculationQueueItem {
            id: QueueItemId::generate(),
            account_id: account,
            recipe_id: item.recipe_id,
            trigger_reason: item.trigger_reason,
            trigger_details: item.trigger_details.clone(),
            status: QueueItemStatus::Pending,
            error_message: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.state().queue.push(stored.clone());
        Ok(stored)
    }

    async fn pending_items(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
        let mut pending: Vec<RecalculationQueueItem> = self
            .state()
            .queue
            .iter()
            .filter(|q| q.account_id == account && q.status == QueueItemStatus::Pending)
            .cloned()
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn mark_processing(
        &self,
        account: AccountId,
        id: QueueItemId,
    ) -> Result<bool, RepositoryError> {
        match self.transition(account, id, QueueItemStatus::Processing, None) {
            Err(RepositoryError::NotFound) => Ok(false),
            other => other,
        }
    }

    async fn mark_completed(
        &self,
        account: AccountId,
        id: QueueItemId,
    ) -> Result<(), RepositoryError> {
        let moved = self.transition(account, id, QueueItemStatus::Completed, None)?;
        ensure_transitioned(id, moved)
    }

    async fn mark_failed(
        &self,
        account: AccountId,
        id: QueueItemId,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let moved = self.transition(account, id, QueueItemStatus::Failed, Some(error_message))?;
        ensure_transitioned(id, moved)
    }

    async fn queue_counts(&self, account: AccountId) -> Result<QueueCounts, RepositoryError> {
        let mut counts = QueueCounts::default();
        for item in self.state().queue.iter().filter(|q| q.account_id == account) {
            match item.status {
                QueueItemStatus::Pending => counts.pending += 1,
                QueueItemStatus::Processing => counts.processing += 1,
                QueueItemStatus::Completed => counts.completed += 1,
                QueueItemStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn recent_failures(
        &self,
        account: AccountId,
        limit: i64,
    ) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
        let mut failures: Vec<RecalculationQueueItem> = self
            .state()
            .queue
            .iter()
            .rev()
            .filter(|q| q.account_id == account && q.status == QueueItemStatus::Failed)
            .cloned()
            .collect();

        failures.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        failures.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(failures)
    }

    async fn delete_finished_before(
        &self,
        account: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state();
        let before = state.queue.len();
        state.queue.retain(|q| {
            !(q.account_id == account && q.status.is_terminal() && q.created_at < cutoff)
        });
        Ok(u64::try_from(before - state.queue.len()).unwrap_or_default())
    }
}
