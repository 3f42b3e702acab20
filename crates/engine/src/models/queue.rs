//! Recalculation queue models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hpp_core::{AccountId, QueueItemId, QueueItemStatus, RecipeId, TriggerReason};

/// A unit of recalculation work for one recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationQueueItem {
    /// Unique item ID.
    pub id: QueueItemId,
    /// Owning business account.
    pub account_id: AccountId,
    /// Recipe to recalculate.
    pub recipe_id: RecipeId,
    /// Why the item was created.
    pub trigger_reason: TriggerReason,
    /// Structured context for the trigger (ingredient id, operator note, ...).
    pub trigger_details: serde_json::Value,
    /// Current status.
    pub status: QueueItemStatus,
    /// Error message, when failed.
    pub error_message: Option<String>,
    /// When the item reached a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
}

/// Parameters for enqueueing a recalculation.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    /// Recipe to recalculate.
    pub recipe_id: RecipeId,
    /// Why the item is created.
    pub trigger_reason: TriggerReason,
    /// Structured trigger context.
    pub trigger_details: serde_json::Value,
}

/// Number of queue items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Items waiting to be processed.
    pub pending: i64,
    /// Items claimed by a batch.
    pub processing: i64,
    /// Items processed successfully.
    pub completed: i64,
    /// Items that failed.
    pub failed: i64,
}

impl QueueCounts {
    /// Total number of items across all statuses.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
