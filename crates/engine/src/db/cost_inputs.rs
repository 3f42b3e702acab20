//! Database operations for cost inputs: productions, operational costs and
//! purchase transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use hpp_core::{
    AccountId, IngredientId, OperationalCostId, ProductionId, ProductionStatus, RecipeId,
    StockTransactionId, TransactionType,
};

use super::RepositoryError;
use crate::models::{OperationalCost, Production, ProductionQuery, PurchaseQuery, StockTransaction};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductionRow {
    id: Uuid,
    account_id: Uuid,
    recipe_id: Uuid,
    status: ProductionStatus,
    actual_quantity: Option<Decimal>,
    labor_cost: Decimal,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ProductionRow> for Production {
    fn from(row: ProductionRow) -> Self {
        Self {
            id: ProductionId::new(row.id),
            account_id: AccountId::new(row.account_id),
            recipe_id: RecipeId::new(row.recipe_id),
            status: row.status,
            actual_quantity: row.actual_quantity,
            labor_cost: row.labor_cost,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OperationalCostRow {
    id: Uuid,
    account_id: Uuid,
    category: String,
    description: String,
    amount: Decimal,
    is_active: bool,
}

impl From<OperationalCostRow> for OperationalCost {
    fn from(row: OperationalCostRow) -> Self {
        Self {
            id: OperationalCostId::new(row.id),
            account_id: AccountId::new(row.account_id),
            category: row.category,
            description: row.description,
            amount: row.amount,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockTransactionRow {
    id: Uuid,
    account_id: Uuid,
    ingredient_id: Uuid,
    transaction_type: TransactionType,
    quantity: Decimal,
    unit_price: Option<Decimal>,
    total_price: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl From<StockTransactionRow> for StockTransaction {
    fn from(row: StockTransactionRow) -> Self {
        Self {
            id: StockTransactionId::new(row.id),
            account_id: AccountId::new(row.account_id),
            ingredient_id: IngredientId::new(row.ingredient_id),
            transaction_type: row.transaction_type,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for read-only cost inputs.
pub struct CostInputRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CostInputRepository<'a> {
    /// Create a new cost input repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Completed productions matching the query, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn completed_productions(
        &self,
        account: AccountId,
        query: &ProductionQuery,
    ) -> Result<Vec<Production>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductionRow>(
            r"
            SELECT id, account_id, recipe_id, status, actual_quantity,
                   labor_cost, completed_at, created_at
            FROM hpp.productions
            WHERE account_id = $1
              AND status = 'COMPLETED'
              AND ($2::uuid IS NULL OR recipe_id = $2)
              AND ($3::timestamptz IS NULL OR COALESCE(completed_at, created_at) >= $3)
            ORDER BY COALESCE(completed_at, created_at) DESC, id
            LIMIT $4
            ",
        )
        .bind(account)
        .bind(query.recipe_id)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All active operational costs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_operational_costs(
        &self,
        account: AccountId,
    ) -> Result<Vec<OperationalCost>, RepositoryError> {
        let rows = sqlx::query_as::<_, OperationalCostRow>(
            r"
            SELECT id, account_id, category, description, amount, is_active
            FROM hpp.operational_costs
            WHERE account_id = $1 AND is_active
            ORDER BY created_at, id
            ",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Purchase transactions matching the query, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purchase_transactions(
        &self,
        account: AccountId,
        query: &PurchaseQuery,
    ) -> Result<Vec<StockTransaction>, RepositoryError> {
        if query.ingredient_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ingredient_ids: Vec<Uuid> = query
            .ingredient_ids
            .iter()
            .map(IngredientId::as_uuid)
            .collect();

        let rows = sqlx::query_as::<_, StockTransactionRow>(
            r"
            SELECT id, account_id, ingredient_id, type AS transaction_type,
                   quantity, unit_price, total_price, created_at
            FROM hpp.stock_transactions
            WHERE account_id = $1
              AND type = 'PURCHASE'
              AND ingredient_id = ANY($2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
            ORDER BY created_at DESC, id
            LIMIT $4
            ",
        )
        .bind(account)
        .bind(&ingredient_ids)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
