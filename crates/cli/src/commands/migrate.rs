//! Database migration command.
//!
//! ```bash
//! hpp migrate
//! ```
//!
//! Migrations live in `crates/engine/migrations/` and create the `hpp`
//! schema.

use hpp_engine::config::EngineConfig;
use hpp_engine::db;

use super::CliError;

/// Run the engine migrations.
pub async fn run(config: &EngineConfig) -> Result<(), CliError> {
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running HPP migrations...");
    sqlx::migrate!("../engine/migrations").run(&pool).await?;

    tracing::info!("HPP migrations complete");
    Ok(())
}
