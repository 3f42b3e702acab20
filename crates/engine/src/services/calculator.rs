//! HPP calculation.
//!
//! Combines material cost with the labor, overhead and WAC components,
//! persists an append-only snapshot and refreshes the recipe's cached
//! `cost_per_unit`.
//!
//! Component values are computed per unit and rounded to
//! [`COST_SCALE`](crate::money::COST_SCALE) places before being multiplied by
//! servings, so `total_hpp == cost_per_unit * production_quantity` holds
//! exactly for every snapshot.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use hpp_core::{AccountId, IngredientId, RecipeId};

use super::alerts::{self, AlertSeverity, HppAlert};
use super::labor::{LaborEstimator, LaborTier};
use super::overhead::{OverheadAllocator, OverheadMethod};
use super::wac::{WacCalculator, WacLine};
use crate::config::CostingConfig;
use crate::db::{CostStore, RepositoryError};
use crate::error::{HppError, Result};
use crate::models::{HppCalculation, MaterialLine, NewHppCalculation, RecipeWithIngredients};
use crate::money::{self, round_cost};

/// Per-unit cost components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub material: Decimal,
    pub labor: Decimal,
    pub overhead: Decimal,
    pub wac: Decimal,
}

/// Outcome of a successful calculation.
#[derive(Debug, Clone, Serialize)]
pub struct HppCalculationResult {
    /// The persisted snapshot.
    pub calculation: HppCalculation,
    /// Rounded per-unit components.
    pub per_unit: CostBreakdown,
    pub labor_source: LaborTier,
    pub overhead_method: OverheadMethod,
    /// Lines skipped because their ingredient no longer exists.
    pub skipped_lines: Vec<IngredientId>,
    pub alerts: Vec<HppAlert>,
}

struct MaterialCost {
    total: Decimal,
    lines: Vec<MaterialLine>,
    wac_lines: Vec<WacLine>,
    skipped: Vec<IngredientId>,
}

/// Calculates and persists HPP snapshots.
pub struct HppCalculator<S> {
    store: Arc<S>,
    config: Arc<CostingConfig>,
}

impl<S> Clone for HppCalculator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: CostStore> HppCalculator<S> {
    /// Create a new calculator.
    #[must_use]
    pub const fn new(store: Arc<S>, config: Arc<CostingConfig>) -> Self {
        Self { store, config }
    }

    /// Calculate, persist and cache the HPP of a recipe.
    ///
    /// # Errors
    ///
    /// - `HppError::NotFound` if the recipe does not exist in the account
    /// - `HppError::Validation` if the recipe graph is malformed
    /// - `HppError::InvalidState` if servings is not positive
    /// - `HppError::Calculation` if a value is not representable
    /// - `HppError::Repository` if the store fails
    #[instrument(skip_all, fields(account = %account, recipe = %recipe_id))]
    pub async fn calculate_recipe_hpp(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<HppCalculationResult> {
        let now = Utc::now();
        let graph = self
            .store
            .get_recipe_with_ingredients(account, recipe_id)
            .await?
            .ok_or_else(|| HppError::NotFound(format!("recipe {recipe_id}")))?;

        validate_graph(&graph)?;

        let servings = graph.recipe.servings;
        if servings <= 0 {
            return Err(HppError::InvalidState(format!(
                "recipe {recipe_id} has non-positive servings ({servings})"
            )));
        }
        let servings_dec = Decimal::from(servings);

        let material = material_cost(&graph)?;
        let material_per_unit = money::div(material.total, servings_dec)?;

        let store = self.store.as_ref();
        let config = self.config.as_ref();
        let labor_estimator = LaborEstimator::new(store, config);
        let overhead_allocator = OverheadAllocator::new(store, config);
        let wac_calculator = WacCalculator::new(store, config);

        let (labor, overhead, wac, previous) = tokio::try_join!(
            labor_estimator.estimate(account, recipe_id, now),
            overhead_allocator.allocate(account, recipe_id, now),
            wac_calculator.adjustment(account, &material.wac_lines, servings_dec, now),
            async {
                self.store
                    .latest_calculation(account, recipe_id)
                    .await
                    .map_err(HppError::from)
            },
        )?;

        let per_unit = CostBreakdown {
            material: round_cost(material_per_unit),
            labor: round_cost(labor.per_unit),
            overhead: round_cost(overhead.per_unit),
            wac: round_cost(wac.per_unit),
        };

        let mut cost_per_unit =
            money::sum([per_unit.material, per_unit.labor, per_unit.overhead, per_unit.wac])?;
        if cost_per_unit < Decimal::ZERO {
            warn!(
                cost_per_unit = %cost_per_unit,
                wac = %per_unit.wac,
                "Negative cost per unit clamped to zero"
            );
            cost_per_unit = Decimal::ZERO;
        }

        let new_calculation = NewHppCalculation {
            recipe_id,
            calculation_date: now.date_naive(),
            material_cost: money::mul(per_unit.material, servings_dec)?,
            labor_cost: money::mul(per_unit.labor, servings_dec)?,
            overhead_cost: money::mul(per_unit.overhead, servings_dec)?,
            wac_adjustment: money::mul(per_unit.wac, servings_dec)?,
            total_hpp: money::mul(cost_per_unit, servings_dec)?,
            cost_per_unit,
            production_quantity: servings,
            material_breakdown: material.lines,
            notes: Some(format!(
                "labor: {}; overhead: {}",
                labor.source, overhead.method
            )),
        };

        let calculation = self
            .store
            .record_calculation(account, &new_calculation)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => HppError::NotFound(format!("recipe {recipe_id}")),
                other => HppError::Repository(other),
            })?;

        let alerts = alerts::evaluate(
            previous.as_ref(),
            &calculation,
            graph.recipe.selling_price,
        );
        log_alerts(&alerts);

        info!(
            calculation_id = %calculation.id,
            cost_per_unit = %calculation.cost_per_unit,
            total_hpp = %calculation.total_hpp,
            labor_source = %labor.source,
            overhead_method = %overhead.method,
            "HPP calculated"
        );

        Ok(HppCalculationResult {
            calculation,
            per_unit,
            labor_source: labor.source,
            overhead_method: overhead.method,
            skipped_lines: material.skipped,
            alerts,
        })
    }

    /// Most recent snapshot for a recipe.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Repository` if the store read fails.
    pub async fn get_latest_hpp(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<HppCalculation>> {
        Ok(self.store.latest_calculation(account, recipe_id).await?)
    }

    /// Snapshots for a recipe, newest first.
    ///
    /// # Errors
    ///
    /// Returns `HppError::Validation` for a non-positive limit or
    /// `HppError::Repository` if the store read fails.
    pub async fn get_hpp_history(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        limit: i64,
    ) -> Result<Vec<HppCalculation>> {
        if limit <= 0 {
            return Err(HppError::Validation(format!(
                "history limit must be positive, got {limit}"
            )));
        }
        Ok(self
            .store
            .calculation_history(account, recipe_id, limit)
            .await?)
    }

    /// Recalculate several recipes in order. A failing recipe is recorded
    /// and the rest still run.
    pub async fn recalculate_many(&self, account: AccountId, recipe_ids: &[RecipeId]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for &recipe_id in recipe_ids {
            match self.calculate_recipe_hpp(account, recipe_id).await {
                Ok(_) => outcome.processed += 1,
                Err(e) => {
                    error!(recipe = %recipe_id, error = %e, "Recalculation failed");
                    outcome.failed += 1;
                    outcome.errors.push(RecipeFailure {
                        recipe_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

/// A recipe whose recalculation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeFailure {
    pub recipe_id: RecipeId,
    pub error: String,
}

/// Summary of a multi-recipe recalculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<RecipeFailure>,
}

fn validate_graph(graph: &RecipeWithIngredients) -> Result<()> {
    for line in &graph.ingredients {
        if line.recipe_id != graph.recipe.id {
            return Err(HppError::Validation(format!(
                "line for ingredient {} belongs to recipe {}, not {}",
                line.ingredient_id, line.recipe_id, graph.recipe.id
            )));
        }
        if let Some(ingredient) = &line.ingredient {
            if ingredient.id != line.ingredient_id {
                return Err(HppError::Validation(format!(
                    "line references ingredient {} but resolved {}",
                    line.ingredient_id, ingredient.id
                )));
            }
        }
        if line.quantity <= Decimal::ZERO {
            return Err(HppError::Validation(format!(
                "line for ingredient {} has non-positive quantity {}",
                line.ingredient_id, line.quantity
            )));
        }
    }
    Ok(())
}

fn material_cost(graph: &RecipeWithIngredients) -> Result<MaterialCost> {
    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(graph.ingredients.len());
    let mut wac_lines = Vec::with_capacity(graph.ingredients.len());
    let mut skipped = Vec::new();

    for line in &graph.ingredients {
        let Some(ingredient) = &line.ingredient else {
            warn!(
                recipe = %graph.recipe.id,
                ingredient = %line.ingredient_id,
                "Ingredient missing, line skipped"
            );
            skipped.push(line.ingredient_id);
            continue;
        };

        let line_total = money::mul(line.quantity, ingredient.price_per_unit)?;
        total = money::add(total, line_total)?;

        lines.push(MaterialLine {
            ingredient_id: ingredient.id,
            ingredient_name: ingredient.name.clone(),
            quantity: line.quantity,
            unit: line.unit.clone(),
            unit_price: ingredient.price_per_unit,
            line_total,
        });
        wac_lines.push(WacLine {
            ingredient_id: ingredient.id,
            quantity: line.quantity,
            current_price: ingredient.price_per_unit,
        });
    }

    Ok(MaterialCost {
        total,
        lines,
        wac_lines,
        skipped,
    })
}

fn log_alerts(alerts: &[HppAlert]) {
    for alert in alerts {
        if alert.severity >= AlertSeverity::High {
            warn!(
                recipe = %alert.recipe_id,
                kind = ?alert.kind,
                severity = ?alert.severity,
                percent = %alert.percent,
                "{}",
                alert.message
            );
        } else {
            info!(
                recipe = %alert.recipe_id,
                kind = ?alert.kind,
                severity = ?alert.severity,
                percent = %alert.percent,
                "{}",
                alert.message
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use hpp_core::{StockTransactionId, TransactionType};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{RecipeIngredient, StockTransaction};
    use crate::services::alerts::AlertKind;

    struct Fixture {
        store: Arc<MemoryStore>,
        calculator: HppCalculator<MemoryStore>,
        account: AccountId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let calculator =
            HppCalculator::new(Arc::clone(&store), Arc::new(CostingConfig::default()));
        Fixture {
            store,
            calculator,
            account: AccountId::generate(),
        }
    }

    /// Servings 10, A(2 x 1000) + B(1 x 500), labor 30 and overhead 20 per unit.
    fn seed_reference_recipe(f: &Fixture) -> RecipeId {
        let recipe_id = f.store.add_recipe(f.account, "Kue Lapis", 10);
        let a = f.store.add_ingredient(f.account, "Tepung", "kg", Decimal::from(1000));
        let b = f.store.add_ingredient(f.account, "Santan", "l", Decimal::from(500));
        f.store.add_recipe_line(f.account, recipe_id, a, Decimal::from(2), "kg");
        f.store.add_recipe_line(f.account, recipe_id, b, Decimal::ONE, "l");
        f.store.add_completed_production(
            f.account,
            recipe_id,
            Decimal::from(10),
            Decimal::from(300),
            Utc::now() - Duration::days(1),
        );
        f.store.add_operational_cost(f.account, "Sewa Tempat", Decimal::from(200));
        recipe_id
    }

    #[tokio::test]
    async fn test_reference_recipe_costs() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);

        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        assert_eq!(result.per_unit.material, Decimal::from(250));
        assert_eq!(result.per_unit.labor, Decimal::from(30));
        assert_eq!(result.per_unit.overhead, Decimal::from(20));
        assert_eq!(result.per_unit.wac, Decimal::ZERO);
        assert_eq!(result.labor_source, LaborTier::RecipeHistory);
        assert_eq!(result.overhead_method, OverheadMethod::VolumeBased);

        let calculation = &result.calculation;
        assert_eq!(calculation.cost_per_unit, Decimal::from(300));
        assert_eq!(calculation.total_hpp, Decimal::from(3000));
        assert_eq!(calculation.material_cost, Decimal::from(2500));
        assert_eq!(calculation.production_quantity, 10);
        assert_eq!(calculation.material_breakdown.len(), 2);

        let recipe = f.store.get_recipe(f.account, recipe_id).await.unwrap().unwrap();
        assert_eq!(recipe.cost_per_unit, Some(Decimal::from(300)));
    }

    #[tokio::test]
    async fn test_identical_inputs_give_identical_cost() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);

        let first = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();
        let second = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        assert_eq!(first.calculation.cost_per_unit, second.calculation.cost_per_unit);
        assert!(second.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_total_invariant_with_repeating_decimals() {
        let f = fixture();
        let recipe_id = f.store.add_recipe(f.account, "Dadar Gulung", 3);
        let flour = f.store.add_ingredient(f.account, "Tepung", "kg", Decimal::from(1000));
        f.store.add_recipe_line(f.account, recipe_id, flour, Decimal::ONE, "kg");

        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();
        let calculation = &result.calculation;

        assert_eq!(
            calculation.total_hpp,
            calculation.cost_per_unit * Decimal::from(calculation.production_quantity)
        );
        assert_eq!(result.per_unit.material, Decimal::new(3_333_333, 4));
    }

    #[tokio::test]
    async fn test_material_cost_follows_rounded_per_unit() {
        let f = fixture();
        let recipe_id = f.store.add_recipe(f.account, "Dadar Gulung", 3);
        let flour = f.store.add_ingredient(f.account, "Tepung", "kg", Decimal::from(1000));
        f.store.add_recipe_line(f.account, recipe_id, flour, Decimal::ONE, "kg");

        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();
        let calculation = &result.calculation;
        let breakdown_total: Decimal = calculation
            .material_breakdown
            .iter()
            .map(|line| line.line_total)
            .sum();

        assert_eq!(breakdown_total, Decimal::from(1000));
        assert_eq!(calculation.material_cost, Decimal::new(9_999_999, 4));
    }

    #[tokio::test]
    async fn test_missing_ingredient_line_is_skipped() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);
        let gone = f.store.add_ingredient(f.account, "Pandan", "ikat", Decimal::from(3000));
        f.store.add_recipe_line(f.account, recipe_id, gone, Decimal::ONE, "ikat");
        f.store.remove_ingredient(gone);

        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        assert_eq!(result.skipped_lines, vec![gone]);
        assert_eq!(result.calculation.material_cost, Decimal::from(2500));
    }

    #[tokio::test]
    async fn test_unknown_recipe_is_not_found() {
        let f = fixture();
        let err = f
            .calculator
            .calculate_recipe_hpp(f.account, RecipeId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, HppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recipe_from_other_account_is_not_found() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);
        let err = f
            .calculator
            .calculate_recipe_hpp(AccountId::generate(), recipe_id)
            .await
            .unwrap_err();
        assert!(matches!(err, HppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_servings_is_invalid_state() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);
        f.store.set_servings(recipe_id, 0);

        let err = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap_err();
        assert!(matches!(err, HppError::InvalidState(_)));
        assert!(f.store.calculations(f.account).is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_line_quantity_is_validation_error() {
        let f = fixture();
        let recipe_id = f.store.add_recipe(f.account, "Cendol", 5);
        let ingredient_id = f.store.add_ingredient(f.account, "Gula Merah", "kg", Decimal::from(20_000));
        f.store.insert_recipe_line(
            f.account,
            RecipeIngredient {
                recipe_id,
                ingredient_id,
                quantity: Decimal::ZERO,
                unit: "kg".into(),
                ingredient: None,
            },
        );

        let err = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap_err();
        assert!(matches!(err, HppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_negative_cost_is_clamped_to_zero() {
        let f = fixture();
        let recipe_id = f.store.add_recipe(f.account, "Retur", 1);
        let item = f.store.add_ingredient(f.account, "Kemasan", "pcs", Decimal::from(10_000));
        f.store.add_recipe_line(f.account, recipe_id, item, Decimal::ONE, "pcs");
        f.store.add_completed_production(f.account, recipe_id, Decimal::ONE, Decimal::ONE, Utc::now());
        f.store.insert_transaction(StockTransaction {
            id: StockTransactionId::generate(),
            account_id: f.account,
            ingredient_id: item,
            transaction_type: TransactionType::Purchase,
            quantity: Decimal::ONE,
            unit_price: None,
            total_price: Some(Decimal::from(-5000)),
            created_at: Utc::now(),
        });

        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        assert!(result.per_unit.wac < Decimal::ZERO);
        assert_eq!(result.calculation.cost_per_unit, Decimal::ZERO);
        assert_eq!(result.calculation.total_hpp, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_price_increase_raises_alert() {
        let f = fixture();
        let recipe_id = f.store.add_recipe(f.account, "Martabak", 1);
        let egg = f.store.add_ingredient(f.account, "Telur", "butir", Decimal::from(2000));
        f.store.add_recipe_line(f.account, recipe_id, egg, Decimal::from(10), "butir");
        f.store.add_completed_production(f.account, recipe_id, Decimal::ONE, Decimal::from(1000), Utc::now());

        f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();
        f.store.set_ingredient_price(egg, Decimal::from(3000));
        let result = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].kind, AlertKind::CostIncrease);
        assert_eq!(result.alerts[0].severity, AlertSeverity::High);
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let f = fixture();
        let recipe_id = seed_reference_recipe(&f);
        let first = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();
        let second = f.calculator.calculate_recipe_hpp(f.account, recipe_id).await.unwrap();

        let history = f.calculator.get_hpp_history(f.account, recipe_id, 5).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.calculation.id);
        assert_eq!(history[1].id, first.calculation.id);

        let latest = f.calculator.get_latest_hpp(f.account, recipe_id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.calculation.id);

        assert!(f.calculator.get_hpp_history(f.account, recipe_id, 0).await.is_err());
    }
}
