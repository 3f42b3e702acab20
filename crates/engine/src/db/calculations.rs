//! Database operations for HPP calculation snapshots.
//!
//! Snapshots are append-only. Recording a snapshot also refreshes the cached
//! `recipes.cost_per_unit` inside the same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use hpp_core::{AccountId, HppCalculationId, RecipeId};

use super::RepositoryError;
use crate::models::{HppCalculation, MaterialLine, NewHppCalculation};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct HppCalculationRow {
    id: Uuid,
    account_id: Uuid,
    recipe_id: Uuid,
    calculation_date: NaiveDate,
    material_cost: Decimal,
    labor_cost: Decimal,
    overhead_cost: Decimal,
    wac_adjustment: Decimal,
    total_hpp: Decimal,
    cost_per_unit: Decimal,
    production_quantity: i32,
    material_breakdown: Json<Vec<MaterialLine>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<HppCalculationRow> for HppCalculation {
    fn from(row: HppCalculationRow) -> Self {
        Self {
            id: HppCalculationId::new(row.id),
            account_id: AccountId::new(row.account_id),
            recipe_id: RecipeId::new(row.recipe_id),
            calculation_date: row.calculation_date,
            material_cost: row.material_cost,
            labor_cost: row.labor_cost,
            overhead_cost: row.overhead_cost,
            wac_adjustment: row.wac_adjustment,
            total_hpp: row.total_hpp,
            cost_per_unit: row.cost_per_unit,
            production_quantity: row.production_quantity,
            material_breakdown: row.material_breakdown.0,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

const CALCULATION_COLUMNS: &str = r"
    id, account_id, recipe_id, calculation_date, material_cost, labor_cost,
    overhead_cost, wac_adjustment, total_hpp, cost_per_unit, production_quantity,
    material_breakdown, notes, created_at
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for HPP calculation snapshots.
pub struct HppCalculationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> HppCalculationRepository<'a> {
    /// Create a new calculation repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a snapshot and update the recipe's cached cost per unit.
    ///
    /// Both writes happen in one transaction. The recipe row is locked first
    /// so concurrent recalculations of the same recipe serialize.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the recipe does not exist in the
    /// account, or `RepositoryError::Database` if a statement fails.
    pub async fn record(
        &self,
        account: AccountId,
        calculation: &NewHppCalculation,
    ) -> Result<HppCalculation, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(Uuid,)> = sqlx::query_as(
            r"
            SELECT id FROM hpp.recipes
            WHERE id = $1 AND account_id = $2
            FOR UPDATE
            ",
        )
        .bind(calculation.recipe_id)
        .bind(account)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let sql = format!(
            r"
            INSERT INTO hpp.hpp_calculations (
                account_id, recipe_id, calculation_date, material_cost, labor_cost,
                overhead_cost, wac_adjustment, total_hpp, cost_per_unit,
                production_quantity, material_breakdown, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {CALCULATION_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, HppCalculationRow>(&sql)
            .bind(account)
            .bind(calculation.recipe_id)
            .bind(calculation.calculation_date)
            .bind(calculation.material_cost)
            .bind(calculation.labor_cost)
            .bind(calculation.overhead_cost)
            .bind(calculation.wac_adjustment)
            .bind(calculation.total_hpp)
            .bind(calculation.cost_per_unit)
            .bind(calculation.production_quantity)
            .bind(Json(&calculation.material_breakdown))
            .bind(calculation.notes.as_deref())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r"
            UPDATE hpp.recipes
            SET cost_per_unit = $1, updated_at = NOW()
            WHERE id = $2 AND account_id = $3
            ",
        )
        .bind(calculation.cost_per_unit)
        .bind(calculation.recipe_id)
        .bind(account)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    /// Most recent snapshot for a recipe.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
    ) -> Result<Option<HppCalculation>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {CALCULATION_COLUMNS}
            FROM hpp.hpp_calculations
            WHERE account_id = $1 AND recipe_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "
        );

        let row = sqlx::query_as::<_, HppCalculationRow>(&sql)
            .bind(account)
            .bind(recipe_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Snapshots for a recipe, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn history(
        &self,
        account: AccountId,
        recipe_id: RecipeId,
        limit: i64,
    ) -> Result<Vec<HppCalculation>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {CALCULATION_COLUMNS}
            FROM hpp.hpp_calculations
            WHERE account_id = $1 AND recipe_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "
        );

        let rows = sqlx::query_as::<_, HppCalculationRow>(&sql)
            .bind(account)
            .bind(recipe_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
