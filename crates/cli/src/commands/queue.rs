//! Trigger and queue commands.
//!
//! ```bash
//! # Publish an upstream change
//! hpp trigger ingredient --account <uuid> --ingredient <uuid>
//! hpp trigger recipe --account <uuid> --recipe <uuid>
//! hpp trigger operational-costs --account <uuid>
//! hpp trigger manual --account <uuid> --recipe <uuid> --reason "supplier invoice"
//!
//! # Work the queue
//! hpp queue process --account <uuid> --batch-size 25
//! hpp queue status --account <uuid>
//! hpp queue cleanup --account <uuid> --days 7
//!
//! # Recalculate every active recipe directly
//! hpp recalc-all --account <uuid>
//! ```

use hpp_core::AccountId;
use hpp_engine::HppEngine;
use hpp_engine::db::PgStore;
use hpp_engine::services::CostEvent;

use super::{CliError, print_json};

/// Publish a cost event and report what it touched.
pub async fn trigger(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    event: CostEvent,
) -> Result<(), CliError> {
    let outcome = engine.queue().publish(account, event).await?;
    print_json(&outcome)
}

/// Process one batch. Falls back to the configured batch size.
pub async fn process(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    batch_size: Option<i64>,
) -> Result<(), CliError> {
    let batch_size = batch_size.unwrap_or(engine.queue_config().batch_size);
    let outcome = engine
        .queue()
        .process_pending_recalculations(account, batch_size)
        .await?;
    print_json(&outcome)
}

/// Show queue counts and recent failures.
pub async fn status(engine: &HppEngine<PgStore>, account: AccountId) -> Result<(), CliError> {
    let status = engine.queue().get_queue_status(account).await?;
    print_json(&status)
}

/// Delete old finished items. Falls back to the configured retention.
pub async fn cleanup(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    days: Option<i64>,
) -> Result<(), CliError> {
    let days = days.unwrap_or(engine.queue_config().retention_days);
    let deleted = engine.queue().cleanup_old_queue_items(account, days).await?;
    tracing::info!(deleted, days, "Queue cleanup complete");
    Ok(())
}

/// Recalculate every active recipe.
pub async fn recalculate_all(engine: &HppEngine<PgStore>, account: AccountId) -> Result<(), CliError> {
    let outcome = engine.queue().batch_recalculate_all(account).await?;
    print_json(&outcome)
}
