//! Calculation and lookup commands.
//!
//! ```bash
//! hpp calculate --account <uuid> --recipe <uuid>
//! hpp latest --account <uuid> --recipe <uuid>
//! hpp history --account <uuid> --recipe <uuid> --limit 20
//! hpp wac --account <uuid> --ingredient <uuid> --days 90
//! ```

use chrono::Utc;
use hpp_core::{AccountId, IngredientId, RecipeId};
use hpp_engine::HppEngine;
use hpp_engine::db::PgStore;
use hpp_engine::services::WacPoint;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{CliError, print_json};

/// Calculate and persist a snapshot.
pub async fn calculate(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    recipe: RecipeId,
) -> Result<(), CliError> {
    let result = engine.calculator().calculate_recipe_hpp(account, recipe).await?;
    tracing::info!(
        cost_per_unit = %result.calculation.cost_per_unit,
        alerts = result.alerts.len(),
        "Calculation stored"
    );
    print_json(&result)
}

/// Show the most recent snapshot.
pub async fn latest(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    recipe: RecipeId,
) -> Result<(), CliError> {
    match engine.calculator().get_latest_hpp(account, recipe).await? {
        Some(calculation) => print_json(&calculation),
        None => {
            tracing::warn!(recipe = %recipe, "Recipe has never been calculated");
            Ok(())
        }
    }
}

/// Show snapshots newest first.
pub async fn history(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    recipe: RecipeId,
    limit: i64,
) -> Result<(), CliError> {
    let history = engine
        .calculator()
        .get_hpp_history(account, recipe, limit)
        .await?;
    print_json(&history)
}

#[derive(Serialize)]
struct WacReport {
    ingredient_id: IngredientId,
    /// Over the full purchase history.
    wac: Option<Decimal>,
    history: Vec<WacPoint>,
}

/// Show an ingredient's WAC and its running history over `days`.
pub async fn wac(
    engine: &HppEngine<PgStore>,
    account: AccountId,
    ingredient: IngredientId,
    days: i64,
) -> Result<(), CliError> {
    let calculator = engine.wac();
    let (wac, history) = tokio::try_join!(
        calculator.ingredient_wac(account, ingredient),
        calculator.wac_history(account, ingredient, days, Utc::now()),
    )?;

    print_json(&WacReport {
        ingredient_id: ingredient,
        wac,
        history,
    })
}
