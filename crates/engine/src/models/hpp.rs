//! HPP calculation snapshot models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hpp_core::{AccountId, HppCalculationId, IngredientId, RecipeId};

/// One resolved ingredient line of a material cost breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLine {
    /// Ingredient used.
    pub ingredient_id: IngredientId,
    /// Ingredient name at calculation time.
    pub ingredient_name: String,
    /// Quantity per batch.
    pub quantity: Decimal,
    /// Unit of `quantity`.
    pub unit: String,
    /// Current price per unit at calculation time.
    pub unit_price: Decimal,
    /// `quantity * unit_price`.
    pub line_total: Decimal,
}

/// A persisted, append-only HPP calculation.
///
/// Component costs are per-batch totals (per-unit value times
/// `production_quantity`), so `total_hpp == cost_per_unit * production_quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HppCalculation {
    /// Unique calculation ID.
    pub id: HppCalculationId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Recipe that was costed.
    pub recipe_id: RecipeId,
    /// Calendar day of the calculation.
    pub calculation_date: NaiveDate,
    /// Material cost per batch: the 4-place per-unit material cost times
    /// servings. May differ from the sum of `material_breakdown` line totals
    /// by the per-unit rounding.
    pub material_cost: Decimal,
    /// Labor cost per batch.
    pub labor_cost: Decimal,
    /// Overhead cost per batch.
    pub overhead_cost: Decimal,
    /// WAC adjustment per batch. May be negative.
    pub wac_adjustment: Decimal,
    /// Total cost per batch.
    pub total_hpp: Decimal,
    /// Cost per produced unit. Never negative.
    pub cost_per_unit: Decimal,
    /// Servings at calculation time.
    pub production_quantity: i32,
    /// Material lines that contributed to `material_cost`.
    pub material_breakdown: Vec<MaterialLine>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the snapshot was written. Orders same-day snapshots.
    pub created_at: DateTime<Utc>,
}

/// Input for recording a new calculation snapshot.
#[derive(Debug, Clone)]
pub struct NewHppCalculation {
    /// Recipe that was costed.
    pub recipe_id: RecipeId,
    /// Calendar day of the calculation.
    pub calculation_date: NaiveDate,
    /// Material cost per batch.
    pub material_cost: Decimal,
    /// Labor cost per batch.
    pub labor_cost: Decimal,
    /// Overhead cost per batch.
    pub overhead_cost: Decimal,
    /// WAC adjustment per batch.
    pub wac_adjustment: Decimal,
    /// Total cost per batch.
    pub total_hpp: Decimal,
    /// Cost per produced unit; also written to the recipe cache.
    pub cost_per_unit: Decimal,
    /// Servings at calculation time.
    pub production_quantity: i32,
    /// Material breakdown.
    pub material_breakdown: Vec<MaterialLine>,
    /// Free-form notes.
    pub notes: Option<String>,
}
