//! Cost input models: production batches, operational costs and stock
//! transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hpp_core::{
    AccountId, IngredientId, OperationalCostId, ProductionId, ProductionStatus, RecipeId,
    StockTransactionId, TransactionType,
};

/// A production batch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Production {
    /// Unique production ID.
    pub id: ProductionId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Recipe that was produced.
    pub recipe_id: RecipeId,
    /// Batch status.
    pub status: ProductionStatus,
    /// Units actually produced.
    pub actual_quantity: Option<Decimal>,
    /// Labor cost booked against the batch.
    pub labor_cost: Decimal,
    /// When the batch finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
}

impl Production {
    /// Produced quantity, treating a missing value as zero.
    #[must_use]
    pub fn quantity(&self) -> Decimal {
        self.actual_quantity.unwrap_or_default()
    }

    /// Timestamp used for recency windows and ordering.
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }
}

/// Filter for completed production batches.
///
/// Results are always restricted to `COMPLETED` batches and ordered newest
/// first by [`Production::finished_at`].
#[derive(Debug, Clone, Default)]
pub struct ProductionQuery {
    /// Restrict to one recipe.
    pub recipe_id: Option<RecipeId>,
    /// Only batches finished at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of batches.
    pub limit: Option<i64>,
}

/// A recurring or one-off operational cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalCost {
    /// Unique cost ID.
    pub id: OperationalCostId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Free-text category, e.g. "Sewa", "Listrik", "Gaji Karyawan".
    pub category: String,
    /// Description of the cost.
    pub description: String,
    /// Amount for the period.
    pub amount: Decimal,
    /// Inactive costs are ignored.
    pub is_active: bool,
}

impl OperationalCost {
    /// Whether the category names a labor cost.
    ///
    /// Matching is a case-insensitive substring search over `keywords`, which
    /// are expected in lowercase.
    #[must_use]
    pub fn is_labor(&self, keywords: &[String]) -> bool {
        let category = self.category.to_lowercase();
        keywords.iter().any(|keyword| category.contains(keyword.as_str()))
    }
}

/// A stock movement for an ingredient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransaction {
    /// Unique transaction ID.
    pub id: StockTransactionId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Ingredient moved.
    pub ingredient_id: IngredientId,
    /// Movement kind.
    pub transaction_type: TransactionType,
    /// Quantity moved.
    pub quantity: Decimal,
    /// Price per unit paid, for purchases.
    pub unit_price: Option<Decimal>,
    /// Total paid, for purchases.
    pub total_price: Option<Decimal>,
    /// When the movement was recorded.
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Cash value of the movement.
    ///
    /// Uses `total_price` when it is set and non-zero, otherwise
    /// `quantity * unit_price`.
    #[must_use]
    pub fn value(&self) -> Decimal {
        match self.total_price {
            Some(total) if !total.is_zero() => total,
            _ => self.quantity * self.unit_price.unwrap_or_default(),
        }
    }
}

/// Filter for purchase transactions, ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct PurchaseQuery {
    /// Ingredients to include. An empty list matches nothing.
    pub ingredient_ids: Vec<IngredientId>,
    /// Only purchases at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of transactions across all ingredients.
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(category: &str) -> OperationalCost {
        OperationalCost {
            id: OperationalCostId::generate(),
            account_id: AccountId::generate(),
            category: category.to_string(),
            description: String::new(),
            amount: Decimal::from(100),
            is_active: true,
        }
    }

    fn keywords() -> Vec<String> {
        vec!["labor".into(), "tenaga kerja".into(), "gaji".into()]
    }

    #[test]
    fn test_is_labor_matches_case_insensitive_substring() {
        assert!(cost("Direct LABOR").is_labor(&keywords()));
        assert!(cost("Gaji Karyawan").is_labor(&keywords()));
        assert!(cost("Biaya Tenaga Kerja").is_labor(&keywords()));
    }

    #[test]
    fn test_is_labor_rejects_other_categories() {
        assert!(!cost("Sewa Tempat").is_labor(&keywords()));
        assert!(!cost("Listrik").is_labor(&keywords()));
    }

    #[test]
    fn test_transaction_value_prefers_total_price() {
        let mut tx = StockTransaction {
            id: StockTransactionId::generate(),
            account_id: AccountId::generate(),
            ingredient_id: IngredientId::generate(),
            transaction_type: TransactionType::Purchase,
            quantity: Decimal::from(4),
            unit_price: Some(Decimal::from(250)),
            total_price: Some(Decimal::from(1100)),
            created_at: Utc::now(),
        };
        assert_eq!(tx.value(), Decimal::from(1100));

        tx.total_price = None;
        assert_eq!(tx.value(), Decimal::from(1000));

        tx.total_price = Some(Decimal::ZERO);
        assert_eq!(tx.value(), Decimal::from(1000));
    }
}
