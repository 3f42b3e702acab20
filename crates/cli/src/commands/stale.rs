//! Staleness audit commands.
//!
//! ```bash
//! hpp stale check --account <uuid> --days 7
//! hpp stale refresh --account <uuid>
//! ```

use hpp_core::AccountId;
use hpp_engine::HppEngine;
use hpp_engine::db::PgStore;

use super::{CliError, print_json};

/// List stale recipes.
pub async fn check(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    days: Option<i64>,
) -> Result<(), CliError> {
    let days = days.unwrap_or(engine.queue_config().stale_days);
    let stale = engine.staleness().check_stale_hpp(account, days).await?;
    print_json(&stale)
}

/// Recalculate stale recipes.
pub async fn refresh(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    days: Option<i64>,
) -> Result<(), CliError> {
    let days = days.unwrap_or(engine.queue_config().stale_days);
    let outcome = engine.staleness().refresh_stale_hpp(account, days).await?;
    print_json(&outcome)
}
