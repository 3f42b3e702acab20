//! Database operations for the recalculation queue.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use hpp_core::{AccountId, QueueItemId, QueueItemStatus, RecipeId, TriggerReason};

use super::RepositoryError;
use crate::models::{NewQueueItem, QueueCounts, RecalculationQueueItem};

#[derive(Debug, sqlx::FromRow)]
struct QueueItemRow {
    id: Uuid,
    account_id: Uuid,
    recipe_id: Uuid,
    trigger_reason: TriggerReason,
    trigger_details: serde_json::Value,
    status: QueueItemStatus,
    error_message: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<QueueItemRow> for RecalculationQueueItem {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: QueueItemId::new(row.id),
            account_id: AccountId::new(row.account_id),
            recipe_id: RecipeId::new(row.recipe_id),
            trigger_reason: row.trigger_reason,
            trigger_details: row.trigger_details,
            status: row.status,
            error_message: row.error_message,
            processed_at: row.processed_at,
            created_at: row.created_at,
        }
    }
}

/// Create a new pending queue item.
///
/// # Errors
///
/// Returns error if the database insert fails.
pub async fn enqueue(
    pool: &PgPool,
    account: AccountId,
    item: &NewQueueItem,
) -> Result<RecalculationQueueItem, RepositoryError> {
    let row = sqlx::query_as::<_, QueueItemRow>(
        r"
        INSERT INTO hpp.recalculation_queue (account_id, recipe_id, trigger_reason, trigger_details)
        VALUES ($1, $2, $3, $4)
        RETURNING id, account_id, recipe_id, trigger_reason, trigger_details,
                  status, error_message, processed_at, created_at
        ",
    )
    .bind(account)
    .bind(item.recipe_id)
    .bind(item.trigger_reason)
    .bind(&item.trigger_details)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get pending items, oldest first.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn pending_items(
    pool: &PgPool,
    account: AccountId,
    limit: i64,
) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, QueueItemRow>(
        r"
        SELECT id, account_id, recipe_id, trigger_reason, trigger_details,
               status, error_message, processed_at, created_at
        FROM hpp.recalculation_queue
        WHERE account_id = $1 AND status = 'pending'
        ORDER BY created_at, id
        LIMIT $2
        ",
    )
    .bind(account)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Claim a pending item.
///
/// Returns `false` if another worker already claimed it.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn mark_processing(
    pool: &PgPool,
    account: AccountId,
    id: QueueItemId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE hpp.recalculation_queue
        SET status = 'processing'
        WHERE id = $1 AND account_id = $2 AND status = 'pending'
        ",
    )
    .bind(id)
    .bind(account)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a processing item as completed.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the item is not processing.
pub async fn mark_completed(
    pool: &PgPool,
    account: AccountId,
    id: QueueItemId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE hpp.recalculation_queue
        SET status = 'completed', processed_at = NOW(), error_message = NULL
        WHERE id = $1 AND account_id = $2 AND status = 'processing'
        ",
    )
    .bind(id)
    .bind(account)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "queue item {id} is not processing"
        )));
    }

    Ok(())
}

/// Mark a processing item as failed with error.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the item is not processing.
pub async fn mark_failed(
    pool: &PgPool,
    account: AccountId,
    id: QueueItemId,
    error_message: &str,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE hpp.recalculation_queue
        SET status = 'failed', processed_at = NOW(), error_message = $3
        WHERE id = $1 AND account_id = $2 AND status = 'processing'
        ",
    )
    .bind(id)
    .bind(account)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "queue item {id} is not processing"
        )));
    }

    Ok(())
}

/// Count items per status.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn queue_counts(pool: &PgPool, account: AccountId) -> Result<QueueCounts, RepositoryError> {
    let rows: Vec<(QueueItemStatus, i64)> = sqlx::query_as(
        r"
        SELECT status, COUNT(*)
        FROM hpp.recalculation_queue
        WHERE account_id = $1
        GROUP BY status
        ",
    )
    .bind(account)
    .fetch_all(pool)
    .await?;

    let mut counts = QueueCounts::default();
    for (status, count) in rows {
        match status {
            QueueItemStatus::Pending => counts.pending = count,
            QueueItemStatus::Processing => counts.processing = count,
            QueueItemStatus::Completed => counts.completed = count,
            QueueItemStatus::Failed => counts.failed = count,
        }
    }

    Ok(counts)
}

/// Most recently processed failed items.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn recent_failures(
    pool: &PgPool,
    account: AccountId,
    limit: i64,
) -> Result<Vec<RecalculationQueueItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, QueueItemRow>(
        r"
        SELECT id, account_id, recipe_id, trigger_reason, trigger_details,
               status, error_message, processed_at, created_at
        FROM hpp.recalculation_queue
        WHERE account_id = $1 AND status = 'failed'
        ORDER BY processed_at DESC NULLS LAST, created_at DESC
        LIMIT $2
        ",
    )
    .bind(account)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Delete completed and failed items created before `cutoff`.
///
/// # Errors
///
/// Returns error if the database delete fails.
pub async fn delete_finished_before(
    pool: &PgPool,
    account: AccountId,
    cutoff: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        DELETE FROM hpp.recalculation_queue
        WHERE account_id = $1
          AND status IN ('completed', 'failed')
          AND created_at < $2
        ",
    )
    .bind(account)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
