//! CLI command implementations.

pub mod costing;
pub mod migrate;
pub mod queue;
pub mod stale;

use hpp_engine::config::{ConfigError, EngineConfig};
use hpp_engine::db::PgStore;
use hpp_engine::{HppEngine, HppError};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Hpp(#[from] HppError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Connect to the engine database.
pub async fn connect(config: &EngineConfig) -> Result<HppEngine<PgStore>, CliError> {
    tracing::info!("Connecting to database...");
    Ok(HppEngine::connect(config).await?)
}

/// Write `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}
