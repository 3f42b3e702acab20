//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a production batch.
///
/// Only `Completed` batches feed labor and overhead estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "hpp.production_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

/// Kind of stock movement recorded against an ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "hpp.transaction_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Purchase,
    Usage,
    Adjustment,
    Waste,
}

/// Status of a recalculation queue item.
///
/// `Pending -> Processing -> Completed | Failed`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "hpp.queue_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueItemStatus {
    /// Whether no further transitions are allowed from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a recipe was queued for recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "hpp.trigger_reason", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// An ingredient's price (or purchase cost) changed.
    IngredientWacChange,
    /// The set or quantities of a recipe's ingredients changed.
    RecipeIngredientsChange,
    /// Operational costs changed; overhead allocation is account-wide.
    OperationalCostChange,
    /// Explicit operator request.
    Manual,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IngredientWacChange => write!(f, "ingredient_wac_change"),
            Self::RecipeIngredientsChange => write!(f, "recipe_ingredients_change"),
            Self::OperationalCostChange => write!(f, "operational_cost_change"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for TriggerReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingredient_wac_change" => Ok(Self::IngredientWacChange),
            "recipe_ingredients_change" => Ok(Self::RecipeIngredientsChange),
            "operational_cost_change" => Ok(Self::OperationalCostChange),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("invalid trigger reason: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(QueueItemStatus::Completed.is_terminal());
        assert!(QueueItemStatus::Failed.is_terminal());
        assert!(!QueueItemStatus::Pending.is_terminal());
        assert!(!QueueItemStatus::Processing.is_terminal());
    }

    #[test]
    fn test_valid_transitions() {
        use QueueItemStatus::{Completed, Failed, Pending, Processing};

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_trigger_reason_roundtrip() {
        for reason in [
            TriggerReason::IngredientWacChange,
            TriggerReason::RecipeIngredientsChange,
            TriggerReason::OperationalCostChange,
            TriggerReason::Manual,
        ] {
            assert_eq!(reason.to_string().parse::<TriggerReason>(), Ok(reason));
        }
        assert!("price_change".parse::<TriggerReason>().is_err());
    }

    #[test]
    fn test_production_status_wire_format() {
        let json = serde_json::to_string(&ProductionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
