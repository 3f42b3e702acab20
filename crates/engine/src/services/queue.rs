//! Recalculation queue.
//!
//! Upstream cost changes are published as [`CostEvent`]s. Each event fans
//! out to the affected recipes, which are either enqueued (one item per
//! recipe) or recalculated right away depending on [`TriggerMode`].
//!
//! Queued items are processed in bounded FIFO batches:
//!
//! ```text
//! pending -> processing -> completed
//!                      \-> failed (error_message, processed_at)
//! ```
//!
//! A failing item is marked failed and reported to Sentry; the rest of the
//! batch still runs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use hpp_core::{AccountId, IngredientId, QueueItemId, RecipeId, TriggerReason};

use super::calculator::{BatchOutcome, HppCalculationResult, HppCalculator, RecipeFailure};
use crate::config::{QueueConfig, TriggerMode};
use crate::db::{CostStore, QueueStore};
use crate::error::{HppError, Result};
use crate::models::{NewQueueItem, QueueCounts, RecalculationQueueItem};

const RECENT_FAILURE_LIMIT: i64 = 10;

/// An upstream change that affects recipe costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CostEvent {
    /// An ingredient's price changed.
    IngredientPriceChanged { ingredient_id: IngredientId },
    /// A recipe's ingredient lines changed.
    RecipeIngredientsChanged { recipe_id: RecipeId },
    /// Operational costs changed; overhead and labor are account-wide.
    OperationalCostsChanged,
    /// Operator-requested recalculation.
    Manual { recipe_id: RecipeId, reason: String },
}

/// Result of dispatching a [`CostEvent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    /// Recipes enqueued, or recalculated successfully in immediate mode.
    pub recipes_updated: usize,
    /// Items created in enqueue mode.
    pub queued: Vec<QueueItemId>,
    /// Recipes that failed in immediate mode.
    pub failures: Vec<RecipeFailure>,
}

/// Result of one processing batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Items completed.
    pub processed: usize,
    /// Items failed.
    pub failed: usize,
    /// Pending items left after the batch.
    pub remaining: i64,
}

/// Snapshot of the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub counts: QueueCounts,
    pub recent_failures: Vec<RecalculationQueueItem>,
}

/// Queue service. Construct one per process and share it by reference.
pub struct RecalculationQueue<S> {
    store: Arc<S>,
    calculator: HppCalculator<S>,
    config: Arc<QueueConfig>,
}

impl<S: CostStore + QueueStore> RecalculationQueue<S> {
    /// Create a new queue service.
    #[must_use]
    pub const fn new(store: Arc<S>, calculator: HppCalculator<S>, config: Arc<QueueConfig>) -> Self {
        Self {
            store,
            calculator,
            config,
        }
    }

    /// Dispatch an event to its handler.
    ///
    /// # Errors
    ///
    /// Returns `HppError::NotFound` if the event names a missing recipe or
    /// ingredient, or `HppError::Repository` if the store fails.
    pub async fn publish(&self, account: AccountId, event: CostEvent) -> Result<TriggerOutcome> {
        match event {
            CostEvent::IngredientPriceChanged { ingredient_id } => {
                self.on_ingredient_price_change(account, ingredient_id).await
            }
            CostEvent::RecipeIngredientsChanged { recipe_id } => {
                self.on_recipe_ingredients_change(account, recipe_id).await
            }
            CostEvent::OperationalCostsChanged => self.on_operational_costs_change(account).await,
            CostEvent::Manual { recipe_id, reason } => {
                self.trigger_manual_recalculation(account, recipe_id, &reason)
                    .await
            }
        }
    }

    /// Fan an ingredient price change out to every active recipe using it.
    ///
    /// # Errors
    ///
    /// Returns `HppError::NotFound` if the ingredient does not exist in the
    /// account, or `HppError::Repository` if the store fails.
    #[instrument(skip_all, fields(account = %account, ingredient = %ingredient_id))]
    pub async fn on_ingredient_price_change(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<TriggerOutcome> {
        let ingredient = self
            .store
            .get_ingredient(account, ingredient_id)
            .await?
            .ok_or_else(|| HppError::NotFound(format!("ingredient {ingredient_id}")))?;

        let recipe_ids: Vec<RecipeId> = self
            .store
            .recipes_using_ingredient(account, ingredient_id)
            .await?
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| r.id)
            .collect();

        let details = json!({
            "ingredient_id": ingredient_id,
            "ingredient_name": ingredient.name,
            "price_per_unit": ingredient.price_per_unit,
        });

        self.dispatch(account, &recipe_ids, TriggerReason::IngredientWacChange, &details)
            .await
    }

    /// Queue a recipe whose ingredient lines changed. Inactive recipes are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `HppError::NotFound` if the recipe does not exist in the
    /// account, or `HppError::Repository` if the store fails.
    #[instrument(skip_all, fields(account = %account, recipe = %recipe_id))]
    pub async fn on_recipe_ingredients_change(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<TriggerOutcome> {
        let recipe = self
            .store
            .get_recipe(account, recipe_id)
            .await?
            .ok_or_else(|| HppError::NotFound(format!("recipe {recipe_id}")))?;

        if !recipe.is_active {
            info!("Recipe inactive, recalculation skipped");
            return Ok(TriggerOutcome::default());
        }

        let details = json!({ "recipe_id": recipe_id });
        self.dispatch(
            account,
            &[recipe_id],
            TriggerReason::RecipeIngredientsChange,
            &details,
        )
        .await
    }

    /// Queue every active recipe after an operational cost change.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Repository` if the store fails.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn on_operational_costs_change(&self, account: AccountId) -> Result<TriggerOutcome> {
        let recipe_ids: Vec<RecipeId> = self
            .store
            .list_active_recipes(account)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let details = json!({ "scope": "all_active_recipes" });
        self.dispatch(account, &recipe_ids, TriggerReason::OperationalCostChange, &details)
            .await
    }

    /// Queue one recipe on operator request.
    ///
    /// # Errors
    ///
    /// Returns `HppError::NotFound` if the recipe does not exist in the
    /// account, or `HppError::Repository` if the store fails.
    #[instrument(skip_all, fields(account = %account, recipe = %recipe_id))]
    pub async fn trigger_manual_recalculation(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        reason: &str,
    ) -> Result<TriggerOutcome> {
        if self.store.get_recipe(account, recipe_id).await?.is_none() {
            return Err(HppError::NotFound(format!("recipe {recipe_id}")));
        }

        let details = json!({ "reason": reason });
        self.dispatch(account, &[recipe_id], TriggerReason::Manual, &details)
            .await
    }

    async fn dispatch(
        &self,
        account: AccountId,
        recipe_ids: &[RecipeId],
        reason: TriggerReason,
        details: &serde_json::Value,
    ) -> Result<TriggerOutcome> {
        if recipe_ids.is_empty() {
            info!(reason = %reason, "No recipes affected");
            return Ok(TriggerOutcome::default());
        }

        match self.config.trigger_mode {
            TriggerMode::Enqueue => {
                let mut queued = Vec::with_capacity(recipe_ids.len());
                for &recipe_id in recipe_ids {
                    let item = self
                        .store
                        .enqueue(
                            account,
                            &NewQueueItem {
                                recipe_id,
                                trigger_reason: reason,
                                trigger_details: details.clone(),
                            },
                        )
                        .await?;
                    queued.push(item.id);
                }
                info!(reason = %reason, queued = queued.len(), "Recipes queued for recalculation");
                Ok(TriggerOutcome {
                    recipes_updated: queued.len(),
                    queued,
                    failures: Vec::new(),
                })
            }
            TriggerMode::Immediate => {
                let batch = self.calculator.recalculate_many(account, recipe_ids).await;
                info!(
                    reason = %reason,
                    updated = batch.processed,
                    failed = batch.failed,
                    "Recipes recalculated"
                );
                Ok(TriggerOutcome {
                    recipes_updated: batch.processed,
                    queued: Vec::new(),
                    failures: batch.errors,
                })
            }
        }
    }

    /// Process up to `batch_size` pending items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Validation` for a non-positive batch size, or
    /// `HppError::Repository` if a queue read or status write fails.
    #[instrument(skip_all, fields(account = %account, batch_size = batch_size))]
    pub async fn process_pending_recalculations(
        &self,
        account: AccountId,
        batch_size: i64,
    ) -> Result<ProcessOutcome> {
        if batch_size <= 0 {
            return Err(HppError::Validation(format!(
                "batch size must be positive, got {batch_size}"
            )));
        }

        let items = self.store.pending_items(account, batch_size).await?;
        let mut outcome = ProcessOutcome::default();

        for item in items {
            if !self.store.mark_processing(account, item.id).await? {
                warn!(item = %item.id, "Queue item no longer pending, skipped");
                continue;
            }

            match self.run_item(account, &item).await {
                Ok(result) => {
                    self.store.mark_completed(account, item.id).await?;
                    outcome.processed += 1;
                    info!(
                        item = %item.id,
                        recipe = %item.recipe_id,
                        cost_per_unit = %result.calculation.cost_per_unit,
                        "Queue item completed"
                    );
                }
                Err(e) => {
                    error!(
                        item = %item.id,
                        recipe = %item.recipe_id,
                        reason = %item.trigger_reason,
                        error = %e,
                        "Queue item failed"
                    );
                    sentry::capture_error(&e);
                    self.store
                        .mark_failed(account, item.id, &e.to_string())
                        .await?;
                    outcome.failed += 1;
                }
            }
        }

        outcome.remaining = self.store.queue_counts(account).await?.pending;
        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            remaining = outcome.remaining,
            "Queue batch finished"
        );

        Ok(outcome)
    }

    async fn run_item(
        &self,
        account: AccountId,
        item: &RecalculationQueueItem,
    ) -> Result<HppCalculationResult> {
        let calculation = self.calculator.calculate_recipe_hpp(account, item.recipe_id);
        match self.config.calculation_timeout {
            Some(limit) => tokio::time::timeout(limit, calculation)
                .await
                .unwrap_or_else(|_| Err(HppError::Timeout(limit))),
            None => calculation.await,
        }
    }

    /// Counts per status plus the most recent failures.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Repository` if the store fails.
    pub async fn get_queue_status(&self, account: AccountId) -> Result<QueueStatus> {
        let (counts, recent_failures) = tokio::try_join!(
            self.store.queue_counts(account),
            self.store.recent_failures(account, RECENT_FAILURE_LIMIT),
        )?;

        Ok(QueueStatus {
            counts,
            recent_failures,
        })
    }

    /// Recalculate every active recipe directly, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Repository` if listing recipes fails.
    #[instrument(skip_all, fields(account = %account))]
    pub async fn batch_recalculate_all(&self, account: AccountId) -> Result<BatchOutcome> {
        let recipe_ids: Vec<RecipeId> = self
            .store
            .list_active_recipes(account)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let outcome = self.calculator.recalculate_many(account, &recipe_ids).await;
        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "Batch recalculation finished"
        );
        Ok(outcome)
    }

    /// Delete completed and failed items older than `days_to_keep` days.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Validation` for a non-positive retention, or
    /// `HppError::Repository` if the delete fails.
    #[instrument(skip_all, fields(account = %account, days_to_keep = days_to_keep))]
    pub async fn cleanup_old_queue_items(&self, account: AccountId, days_to_keep: i64) -> Result<u64> {
        if days_to_keep <= 0 {
            return Err(HppError::Validation(format!(
                "retention must be positive, got {days_to_keep} days"
            )));
        }

        let cutoff = Utc::now() - Duration::days(days_to_keep);
        let deleted = self.store.delete_finished_before(account, cutoff).await?;
        info!(deleted, "Old queue items deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use hpp_core::QueueItemStatus;

    use super::*;
    use crate::config::CostingConfig;
    use crate::db::MemoryStore;

    fn queue_with(store: &Arc<MemoryStore>, config: QueueConfig) -> RecalculationQueue<MemoryStore> {
        let calculator = HppCalculator::new(Arc::clone(store), Arc::new(CostingConfig::default()));
        RecalculationQueue::new(Arc::clone(store), calculator, Arc::new(config))
    }

    fn simple_recipe(store: &MemoryStore, account: AccountId, name: &str, ingredient: IngredientId) -> RecipeId {
        let recipe_id = store.add_recipe(account, name, 4);
        store.add_recipe_line(account, recipe_id, ingredient, Decimal::ONE, "kg");
        recipe_id
    }

    #[tokio::test]
    async fn test_ingredient_fan_out_skips_inactive_recipes() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let sugar = store.add_ingredient(account, "Gula", "kg", Decimal::from(15_000));
        let r1 = simple_recipe(&store, account, "R1", sugar);
        let r2 = simple_recipe(&store, account, "R2", sugar);
        let r3 = simple_recipe(&store, account, "R3", sugar);
        store.set_recipe_active(r3, false);

        let queue = queue_with(&store, QueueConfig::default());
        let outcome = queue.on_ingredient_price_change(account, sugar).await.unwrap();

        assert_eq!(outcome.recipes_updated, 2);
        let queued: Vec<RecipeId> = store.queue_items(account).iter().map(|q| q.recipe_id).collect();
        assert!(queued.contains(&r1));
        assert!(queued.contains(&r2));
        assert!(!queued.contains(&r3));
    }

    #[tokio::test]
    async fn test_recipe_with_repeated_ingredient_is_queued_once() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let sugar = store.add_ingredient(account, "Gula", "kg", Decimal::from(15_000));
        let recipe_id = simple_recipe(&store, account, "Kolak", sugar);
        store.add_recipe_line(account, recipe_id, sugar, Decimal::new(5, 1), "kg");

        let queue = queue_with(&store, QueueConfig::default());
        let outcome = queue.on_ingredient_price_change(account, sugar).await.unwrap();

        assert_eq!(outcome.recipes_updated, 1);
        assert_eq!(outcome.queued.len(), 1);
        let items = store.queue_items(account);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].recipe_id, recipe_id);
    }

    #[tokio::test]
    async fn test_unused_ingredient_updates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let salt = store.add_ingredient(account, "Garam", "kg", Decimal::from(5000));

        let queue = queue_with(&store, QueueConfig::default());
        let outcome = queue.on_ingredient_price_change(account, salt).await.unwrap();

        assert_eq!(outcome.recipes_updated, 0);
        assert!(store.queue_items(account).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ingredient_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(&store, QueueConfig::default());
        let err = queue
            .on_ingredient_price_change(AccountId::generate(), IngredientId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, HppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inactive_recipe_change_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Lama", 2);
        store.set_recipe_active(recipe_id, false);

        let queue = queue_with(&store, QueueConfig::default());
        let outcome = queue.on_recipe_ingredients_change(account, recipe_id).await.unwrap();

        assert_eq!(outcome, TriggerOutcome::default());
    }

    #[tokio::test]
    async fn test_recipe_change_records_reason() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let flour = store.add_ingredient(account, "Tepung", "kg", Decimal::from(12_000));
        let recipe_id = simple_recipe(&store, account, "Roti", flour);

        let queue = queue_with(&store, QueueConfig::default());
        let outcome = queue.on_recipe_ingredients_change(account, recipe_id).await.unwrap();

        assert_eq!(outcome.recipes_updated, 1);
        let items = store.queue_items(account);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].trigger_reason, TriggerReason::RecipeIngredientsChange);
        assert_eq!(items[0].status, QueueItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let flour = store.add_ingredient(account, "Tepung", "kg", Decimal::from(12_000));
        let good_a = simple_recipe(&store, account, "A", flour);
        let broken = simple_recipe(&store, account, "B", flour);
        let good_c = simple_recipe(&store, account, "C", flour);
        store.set_servings(broken, 0);

        let queue = queue_with(&store, QueueConfig::default());
        queue.on_operational_costs_change(account).await.unwrap();
        let outcome = queue.process_pending_recalculations(account, 10).await.unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.remaining, 0);

        let items = store.queue_items(account);
        let failed: Vec<_> = items.iter().filter(|q| q.status == QueueItemStatus::Failed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].recipe_id, broken);
        assert!(!failed[0].error_message.as_deref().unwrap_or_default().is_empty());

        assert!(store.latest_calculation(account, good_a).await.unwrap().is_some());
        assert!(store.latest_calculation(account, good_c).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_size_bounds_processing() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let flour = store.add_ingredient(account, "Tepung", "kg", Decimal::from(12_000));
        for name in ["A", "B", "C"] {
            simple_recipe(&store, account, name, flour);
        }

        let queue = queue_with(&store, QueueConfig::default());
        queue.on_ingredient_price_change(account, flour).await.unwrap();
        let outcome = queue.process_pending_recalculations(account, 2).await.unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.remaining, 1);
        assert!(queue.process_pending_recalculations(account, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_immediate_mode_recalculates_without_queueing() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let flour = store.add_ingredient(account, "Tepung", "kg", Decimal::from(12_000));
        let recipe_id = simple_recipe(&store, account, "Roti", flour);

        let queue = queue_with(
            &store,
            QueueConfig {
                trigger_mode: TriggerMode::Immediate,
                ..QueueConfig::default()
            },
        );
        let outcome = queue
            .publish(account, CostEvent::Manual { recipe_id, reason: "audit".into() })
            .await
            .unwrap();

        assert_eq!(outcome.recipes_updated, 1);
        assert!(outcome.queued.is_empty());
        assert!(store.queue_items(account).is_empty());
        assert!(store.latest_calculation(account, recipe_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_manual_trigger_records_reason() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Kopi", 1);

        let queue = queue_with(&store, QueueConfig::default());
        queue
            .trigger_manual_recalculation(account, recipe_id, "supplier invoice corrected")
            .await
            .unwrap();

        let item = &store.queue_items(account)[0];
        assert_eq!(item.trigger_reason, TriggerReason::Manual);
        assert_eq!(item.trigger_details["reason"], "supplier invoice corrected");
    }

    #[tokio::test]
    async fn test_queue_status_and_cleanup() {
        let store = Arc::new(MemoryStore::new());
        let account = AccountId::generate();
        let recipe_id = store.add_recipe(account, "Teh", 0);

        let queue = queue_with(&store, QueueConfig::default());
        queue.trigger_manual_recalculation(account, recipe_id, "check").await.unwrap();
        queue.process_pending_recalculations(account, 10).await.unwrap();

        let status = queue.get_queue_status(account).await.unwrap();
        assert_eq!(status.counts.failed, 1);
        assert_eq!(status.recent_failures.len(), 1);

        // Items created just now are inside any positive retention.
        assert_eq!(queue.cleanup_old_queue_items(account, 7).await.unwrap(), 0);
        assert!(queue.cleanup_old_queue_items(account, 0).await.is_err());
    }
}
