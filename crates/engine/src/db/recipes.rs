//! Database operations for recipes, ingredients and recipe lines.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use hpp_core::{AccountId, IngredientId, RecipeId};

use super::RepositoryError;
use crate::models::{Ingredient, Recipe, RecipeIngredient, RecipeWithIngredients};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for recipe queries.
#[derive(Debug, sqlx::FromRow)]
struct RecipeRow {
    id: Uuid,
    account_id: Uuid,
    name: String,
    servings: i32,
    is_active: bool,
    cost_per_unit: Option<Decimal>,
    selling_price: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for Recipe {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: RecipeId::new(row.id),
            account_id: AccountId::new(row.account_id),
            name: row.name,
            servings: row.servings,
            is_active: row.is_active,
            cost_per_unit: row.cost_per_unit,
            selling_price: row.selling_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for ingredient queries.
#[derive(Debug, sqlx::FromRow)]
struct IngredientRow {
    id: Uuid,
    account_id: Uuid,
    name: String,
    unit: String,
    price_per_unit: Decimal,
    weighted_average_cost: Option<Decimal>,
}

impl From<IngredientRow> for Ingredient {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: IngredientId::new(row.id),
            account_id: AccountId::new(row.account_id),
            name: row.name,
            unit: row.unit,
            price_per_unit: row.price_per_unit,
            weighted_average_cost: row.weighted_average_cost,
        }
    }
}

/// Internal row type for a recipe line left-joined to its ingredient.
#[derive(Debug, sqlx::FromRow)]
struct RecipeLineRow {
    recipe_id: Uuid,
    ingredient_id: Uuid,
    quantity: Decimal,
    unit: String,
    joined_id: Option<Uuid>,
    joined_account_id: Option<Uuid>,
    joined_name: Option<String>,
    joined_unit: Option<String>,
    joined_price_per_unit: Option<Decimal>,
    joined_weighted_average_cost: Option<Decimal>,
}

impl From<RecipeLineRow> for RecipeIngredient {
    fn from(row: RecipeLineRow) -> Self {
        let ingredient = match (
            row.joined_id,
            row.joined_account_id,
            row.joined_name,
            row.joined_unit,
            row.joined_price_per_unit,
        ) {
            (Some(id), Some(account_id), Some(name), Some(unit), Some(price_per_unit)) => {
                Some(Ingredient {
                    id: IngredientId::new(id),
                    account_id: AccountId::new(account_id),
                    name,
                    unit,
                    price_per_unit,
                    weighted_average_cost: row.joined_weighted_average_cost,
                })
            }
            _ => None,
        };

        Self {
            recipe_id: RecipeId::new(row.recipe_id),
            ingredient_id: IngredientId::new(row.ingredient_id),
            quantity: row.quantity,
            unit: row.unit,
            ingredient,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for recipe graph database operations.
pub struct RecipeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RecipeRepository<'a> {
    /// Create a new recipe repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a recipe by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_recipe(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<Recipe>, RepositoryError> {
        let row = sqlx::query_as::<_, RecipeRow>(
            r"
            SELECT id, account_id, name, servings, is_active,
                   cost_per_unit, selling_price, created_at, updated_at
            FROM hpp.recipes
            WHERE id = $1 AND account_id = $2
            ",
        )
        .bind(recipe_id)
        .bind(account)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a recipe with its lines, each left-joined to its ingredient.
    ///
    /// Lines whose ingredient no longer exists in the account come back with
    /// `ingredient: None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_recipe_with_ingredients(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<RecipeWithIngredients>, RepositoryError> {
        let Some(recipe) = self.get_recipe(account, recipe_id).await? else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, RecipeLineRow>(
            r"
            SELECT
                ri.recipe_id, ri.ingredient_id, ri.quantity, ri.unit,
                i.id AS joined_id,
                i.account_id AS joined_account_id,
                i.name AS joined_name,
                i.unit AS joined_unit,
                i.price_per_unit AS joined_price_per_unit,
                i.weighted_average_cost AS joined_weighted_average_cost
            FROM hpp.recipe_ingredients ri
            LEFT JOIN hpp.ingredients i
                ON i.id = ri.ingredient_id AND i.account_id = ri.account_id
            WHERE ri.recipe_id = $1 AND ri.account_id = $2
            ORDER BY ri.created_at, ri.id
            ",
        )
        .bind(recipe_id)
        .bind(account)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(RecipeWithIngredients {
            recipe,
            ingredients: lines.into_iter().map(Into::into).collect(),
        }))
    }

    /// List active recipes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_recipes(
        &self,
        account: AccountId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecipeRow>(
            r"
            SELECT id, account_id, name, servings, is_active,
                   cost_per_unit, selling_price, created_at, updated_at
            FROM hpp.recipes
            WHERE account_id = $1 AND is_active
            ORDER BY created_at, id
            ",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get an ingredient by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Option<Ingredient>, RepositoryError> {
        let row = sqlx::query_as::<_, IngredientRow>(
            r"
            SELECT id, account_id, name, unit, price_per_unit, weighted_average_cost
            FROM hpp.ingredients
            WHERE id = $1 AND account_id = $2
            ",
        )
        .bind(ingredient_id)
        .bind(account)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Distinct recipes with at least one line referencing the ingredient.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recipes_using_ingredient(
        &self,
        account: AccountId,
        ingredient_id: IngredientId,
    ) -> Result<Vec<Recipe>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecipeRow>(
            r"
            SELECT r.id, r.account_id, r.name, r.servings, r.is_active,
                   r.cost_per_unit, r.selling_price, r.created_at, r.updated_at
            FROM hpp.recipes r
            WHERE r.account_id = $1
              AND EXISTS (
                  SELECT 1 FROM hpp.recipe_ingredients ri
                  WHERE ri.recipe_id = r.id
                    AND ri.account_id = $1
                    AND ri.ingredient_id = $2
              )
            ORDER BY r.created_at, r.id
            ",
        )
        .bind(account)
        .bind(ingredient_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
