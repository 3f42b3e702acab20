//! Recipe and ingredient models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hpp_core::{AccountId, IngredientId, RecipeId};

/// A recipe, the unit of costing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique recipe ID.
    pub id: RecipeId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Display name.
    pub name: String,
    /// Units one batch of this recipe yields.
    pub servings: i32,
    /// Inactive recipes are excluded from allocation pools and triggers.
    pub is_active: bool,
    /// Cached per-unit cost from the latest calculation.
    pub cost_per_unit: Option<Decimal>,
    /// Selling price per unit, when the business has set one.
    pub selling_price: Option<Decimal>,
    /// When the recipe was created.
    pub created_at: DateTime<Utc>,
    /// When the recipe was last updated.
    pub updated_at: DateTime<Utc>,
}

/// An ingredient with its current market price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    /// Unique ingredient ID.
    pub id: IngredientId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Display name.
    pub name: String,
    /// Unit the price is quoted in.
    pub unit: String,
    /// Current price per unit. Material cost always uses this value.
    pub price_per_unit: Decimal,
    /// Informational weighted average cost, never used for material cost.
    pub weighted_average_cost: Option<Decimal>,
}

/// One ingredient line of a recipe, with the joined ingredient snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeIngredient {
    /// Recipe this line belongs to.
    pub recipe_id: RecipeId,
    /// Referenced ingredient.
    pub ingredient_id: IngredientId,
    /// Quantity used per batch.
    pub quantity: Decimal,
    /// Unit of `quantity`.
    pub unit: String,
    /// Joined ingredient row. `None` when the reference no longer resolves.
    pub ingredient: Option<Ingredient>,
}

/// A recipe with all of its ingredient lines loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeWithIngredients {
    /// The recipe itself.
    pub recipe: Recipe,
    /// Ingredient lines in insertion order.
    pub ingredients: Vec<RecipeIngredient>,
}
