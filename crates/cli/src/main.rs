//! HPP CLI - Migrations, recalculation and audits.
//!
//! # Usage
//!
//! ```bash
//! # Create the hpp schema
//! hpp migrate
//!
//! # Calculate one recipe
//! hpp calculate --account <uuid> --recipe <uuid>
//!
//! # An ingredient price changed, then work the queue
//! hpp trigger ingredient --account <uuid> --ingredient <uuid>
//! hpp queue process --account <uuid>
//!
//! # Refresh recipes not calculated in the last week
//! hpp stale refresh --account <uuid> --days 7
//! ```
//!
//! # Environment Variables
//!
//! - `HPP_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `HPP_LOG_FORMAT` - `json` for structured logs, text otherwise
//! - `RUST_LOG` - log filter, defaults to `hpp_engine=info,hpp_cli=info`
//! - `SENTRY_DSN` - enables error reporting

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use hpp_core::{AccountId, IngredientId, RecipeId};
use hpp_engine::config::EngineConfig;
use hpp_engine::services::CostEvent;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "hpp")]
#[command(author, version, about = "HPP cost engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AccountArg {
    /// Business account ID
    #[arg(long)]
    account: AccountId,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Calculate and store a recipe's HPP
    Calculate {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        recipe: RecipeId,
    },
    /// Show a recipe's latest HPP
    Latest {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        recipe: RecipeId,
    },
    /// Show a recipe's HPP history, newest first
    History {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        recipe: RecipeId,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show an ingredient's weighted average cost
    Wac {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        ingredient: IngredientId,
        /// History window in days
        #[arg(long, default_value_t = 90)]
        days: i64,
    },
    /// Publish an upstream cost change
    Trigger {
        #[command(subcommand)]
        event: TriggerEvent,
    },
    /// Work the recalculation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Recalculate every active recipe
    RecalcAll {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Find or refresh stale calculations
    Stale {
        #[command(subcommand)]
        action: StaleAction,
    },
}

#[derive(Subcommand)]
enum TriggerEvent {
    /// An ingredient's price changed
    Ingredient {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        ingredient: IngredientId,
    },
    /// A recipe's ingredient lines changed
    Recipe {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        recipe: RecipeId,
    },
    /// Operational costs changed
    OperationalCosts {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Operator-requested recalculation
    Manual {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long)]
        recipe: RecipeId,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Process one batch of pending items
    Process {
        #[command(flatten)]
        account: AccountArg,
        /// Defaults to `HPP_QUEUE_BATCH_SIZE`
        #[arg(long)]
        batch_size: Option<i64>,
    },
    /// Show counts per status and recent failures
    Status {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Delete old completed and failed items
    Cleanup {
        #[command(flatten)]
        account: AccountArg,
        /// Defaults to `HPP_QUEUE_RETENTION_DAYS`
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Subcommand)]
enum StaleAction {
    /// List recipes with missing or old calculations
    Check {
        #[command(flatten)]
        account: AccountArg,
        /// Defaults to `HPP_STALE_DAYS`
        #[arg(long)]
        days: Option<i64>,
    },
    /// Recalculate recipes with missing or old calculations
    Refresh {
        #[command(flatten)]
        account: AccountArg,
        /// Defaults to `HPP_STALE_DAYS`
        #[arg(long)]
        days: Option<i64>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &EngineConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hpp_engine=info,hpp_cli=info".into());

    let is_json = std::env::var("HPP_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the subscriber picks up its layer.
    let sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<(), CliError> {
    if matches!(cli.command, Commands::Migrate) {
        return commands::migrate::run(config).await;
    }

    let engine = commands::connect(config).await?;

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Calculate { account, recipe } => {
            commands::costing::calculate(&engine, account.account, recipe).await
        }
        Commands::Latest { account, recipe } => {
            commands::costing::latest(&engine, account.account, recipe).await
        }
        Commands::History {
            account,
            recipe,
            limit,
        } => commands::costing::history(&engine, account.account, recipe, limit).await,
        Commands::Wac {
            account,
            ingredient,
            days,
        } => commands::costing::wac(&engine, account.account, ingredient, days).await,
        Commands::Trigger { event } => {
            let (account, event) = match event {
                TriggerEvent::Ingredient {
                    account,
                    ingredient,
                } => (
                    account,
                    CostEvent::IngredientPriceChanged {
                        ingredient_id: ingredient,
                    },
                ),
                TriggerEvent::Recipe { account, recipe } => (
                    account,
                    CostEvent::RecipeIngredientsChanged { recipe_id: recipe },
                ),
                TriggerEvent::OperationalCosts { account } => {
                    (account, CostEvent::OperationalCostsChanged)
                }
                TriggerEvent::Manual {
                    account,
                    recipe,
                    reason,
                } => (
                    account,
                    CostEvent::Manual {
                        recipe_id: recipe,
                        reason,
                    },
                ),
            };
            commands::queue::trigger(&engine, account.account, event).await
        }
        Commands::Queue { action } => match action {
            QueueAction::Process {
                account,
                batch_size,
            } => commands::queue::process(&engine, account.account, batch_size).await,
            QueueAction::Status { account } => {
                commands::queue::status(&engine, account.account).await
            }
            QueueAction::Cleanup { account, days } => {
                commands::queue::cleanup(&engine, account.account, days).await
            }
        },
        Commands::RecalcAll { account } => {
            commands::queue::recalculate_all(&engine, account.account).await
        }
        Commands::Stale { action } => match action {
            StaleAction::Check { account, days } => {
                commands::stale::check(&engine, account.account, days).await
            }
            StaleAction::Refresh { account, days } => {
                commands::stale::refresh(&engine, account.account, days).await
            }
        },
    }
}
