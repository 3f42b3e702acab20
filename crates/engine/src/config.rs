//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `HPP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)
//!
//! ## Optional (costing)
//! - `HPP_DEFAULT_LABOR_PER_UNIT` - Last-resort labor cost per unit (default: 5000)
//! - `HPP_DEFAULT_OVERHEAD_PER_SERVING` - Overhead per serving with no active recipes (default: 2000)
//! - `HPP_PRODUCTION_WINDOW_DAYS` - Trailing window for production volumes (default: 30)
//! - `HPP_RECIPE_LABOR_SAMPLE` - Recent batches sampled per recipe (default: 100)
//! - `HPP_ACCOUNT_LABOR_SAMPLE` - Recent batches sampled per account (default: 500)
//! - `HPP_WAC_LOOKBACK_DAYS` - Purchase lookback for WAC (default: 90)
//! - `HPP_WAC_TRANSACTION_LIMIT` - Most recent purchases considered (default: 50)
//! - `HPP_LABOR_KEYWORDS` - Comma-separated labor categories (default: labor,tenaga kerja,gaji)
//! - `HPP_NEW_RECIPE_OVERHEAD` - `equal_share` or `default_rate` (default: `equal_share`)
//!
//! ## Optional (queue)
//! - `HPP_QUEUE_BATCH_SIZE` - Items per processing batch (default: 10)
//! - `HPP_QUEUE_RETENTION_DAYS` - Days finished items are kept (default: 7)
//! - `HPP_STALE_DAYS` - Age after which a calculation is stale (default: 7)
//! - `HPP_CALCULATION_TIMEOUT_SECS` - Per-item calculation timeout (default: none)
//! - `HPP_TRIGGER_MODE` - `enqueue` or `immediate` (default: `enqueue`)

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_LABOR_KEYWORDS: &[&str] = &["labor", "tenaga kerja", "gaji"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Full engine configuration.
///
/// Implements `Debug` manually to redact the database URL.
#[derive(Clone)]
pub struct EngineConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Costing parameters
    pub costing: CostingConfig,
    /// Queue and staleness parameters
    pub queue: QueueConfig,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("database_url", &"[REDACTED]")
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .field("sentry_sample_rate", &self.sentry_sample_rate)
            .field("costing", &self.costing)
            .field("queue", &self.queue)
            .finish()
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get_database_url(lookup, "HPP_DATABASE_URL")?;
        let sentry_sample_rate: f32 = parse_or_default(lookup, "SENTRY_SAMPLE_RATE", 1.0)?;
        if !(0.0..=1.0).contains(&sentry_sample_rate) {
            return Err(ConfigError::InvalidEnvVar(
                "SENTRY_SAMPLE_RATE".to_string(),
                "must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            sentry_dsn: lookup("SENTRY_DSN"),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
            costing: CostingConfig::from_lookup(lookup)?,
            queue: QueueConfig::from_lookup(lookup)?,
        })
    }
}

/// How overhead is assigned to a recipe with no recent production volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewRecipeOverhead {
    /// Split total overhead equally across active recipes, then per average
    /// serving.
    #[default]
    EqualShare,
    /// Use the configured default overhead per serving.
    DefaultRate,
}

impl FromStr for NewRecipeOverhead {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal_share" => Ok(Self::EqualShare),
            "default_rate" => Ok(Self::DefaultRate),
            other => Err(format!("expected equal_share or default_rate, got {other}")),
        }
    }
}

/// What a trigger does with the affected recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Insert one queue item per recipe.
    #[default]
    Enqueue,
    /// Recalculate each recipe right away.
    Immediate,
}

impl FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enqueue" => Ok(Self::Enqueue),
            "immediate" => Ok(Self::Immediate),
            other => Err(format!("expected enqueue or immediate, got {other}")),
        }
    }
}

/// Parameters for labor, overhead and WAC estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostingConfig {
    /// Labor cost per unit when no tier has data.
    pub default_labor_per_unit: Decimal,
    /// Overhead per serving when the account has no active recipes.
    pub default_overhead_per_serving: Decimal,
    /// Trailing window for production volumes, in days.
    pub production_window_days: i64,
    /// Most recent completed batches sampled for the recipe labor tier.
    pub recipe_labor_sample: i64,
    /// Most recent completed batches sampled for the account labor tier.
    pub account_labor_sample: i64,
    /// Purchase lookback window for WAC, in days.
    pub wac_lookback_days: i64,
    /// Most recent purchases considered for WAC.
    pub wac_transaction_limit: i64,
    /// Lowercase category keywords that mark an operational cost as labor.
    pub labor_keywords: Vec<String>,
    /// Overhead strategy for recipes without recent volume.
    pub new_recipe_overhead: NewRecipeOverhead,
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            default_labor_per_unit: Decimal::from(5000),
            default_overhead_per_serving: Decimal::from(2000),
            production_window_days: 30,
            recipe_labor_sample: 100,
            account_labor_sample: 500,
            wac_lookback_days: 90,
            wac_transaction_limit: 50,
            labor_keywords: DEFAULT_LABOR_KEYWORDS
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
            new_recipe_overhead: NewRecipeOverhead::EqualShare,
        }
    }
}

impl CostingConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let labor_keywords = match lookup("HPP_LABOR_KEYWORDS") {
            Some(raw) => {
                let keywords: Vec<String> = raw
                    .split(',')
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keywords.is_empty() {
                    return Err(ConfigError::InvalidEnvVar(
                        "HPP_LABOR_KEYWORDS".to_string(),
                        "at least one keyword is required".to_string(),
                    ));
                }
                keywords
            }
            None => defaults.labor_keywords,
        };

        Ok(Self {
            default_labor_per_unit: parse_or_default(
                lookup,
                "HPP_DEFAULT_LABOR_PER_UNIT",
                defaults.default_labor_per_unit,
            )?,
            default_overhead_per_serving: parse_or_default(
                lookup,
                "HPP_DEFAULT_OVERHEAD_PER_SERVING",
                defaults.default_overhead_per_serving,
            )?,
            production_window_days: parse_positive(
                lookup,
                "HPP_PRODUCTION_WINDOW_DAYS",
                defaults.production_window_days,
            )?,
            recipe_labor_sample: parse_positive(
                lookup,
                "HPP_RECIPE_LABOR_SAMPLE",
                defaults.recipe_labor_sample,
            )?,
            account_labor_sample: parse_positive(
                lookup,
                "HPP_ACCOUNT_LABOR_SAMPLE",
                defaults.account_labor_sample,
            )?,
            wac_lookback_days: parse_positive(
                lookup,
                "HPP_WAC_LOOKBACK_DAYS",
                defaults.wac_lookback_days,
            )?,
            wac_transaction_limit: parse_positive(
                lookup,
                "HPP_WAC_TRANSACTION_LIMIT",
                defaults.wac_transaction_limit,
            )?,
            labor_keywords,
            new_recipe_overhead: parse_or_default(
                lookup,
                "HPP_NEW_RECIPE_OVERHEAD",
                defaults.new_recipe_overhead,
            )?,
        })
    }
}

/// Parameters for queue processing and staleness audits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Items processed per batch.
    pub batch_size: i64,
    /// Days finished queue items are retained.
    pub retention_days: i64,
    /// Age in days after which a calculation is stale.
    pub stale_days: i64,
    /// Per-item calculation timeout inside a batch.
    pub calculation_timeout: Option<Duration>,
    /// What triggers do with affected recipes.
    pub trigger_mode: TriggerMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retention_days: 7,
            stale_days: 7,
            calculation_timeout: None,
            trigger_mode: TriggerMode::Enqueue,
        }
    }
}

impl QueueConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let calculation_timeout = lookup("HPP_CALCULATION_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| {
                        ConfigError::InvalidEnvVar(
                            "HPP_CALCULATION_TIMEOUT_SECS".to_string(),
                            format!("expected a positive number of seconds, got {raw}"),
                        )
                    })
            })
            .transpose()?;

        Ok(Self {
            batch_size: parse_positive(lookup, "HPP_QUEUE_BATCH_SIZE", defaults.batch_size)?,
            retention_days: parse_positive(
                lookup,
                "HPP_QUEUE_RETENTION_DAYS",
                defaults.retention_days,
            )?,
            stale_days: parse_positive(lookup, "HPP_STALE_DAYS", defaults.stale_days)?,
            calculation_timeout,
            trigger_mode: parse_or_default(lookup, "HPP_TRIGGER_MODE", defaults.trigger_mode)?,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn get_database_url(
    lookup: &dyn Fn(&str) -> Option<String>,
    primary_key: &str,
) -> Result<SecretString, ConfigError> {
    lookup(primary_key)
        .or_else(|| lookup("DATABASE_URL"))
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
}

fn parse_or_default<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_positive(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let value = parse_or_default(lookup, key, default)?;
    if value <= 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be positive, got {value}"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_only_database_url_set() {
        let lookup = lookup_from(&[("HPP_DATABASE_URL", "postgres://localhost/hpp")]);
        let config = EngineConfig::from_lookup(&lookup).unwrap();

        assert_eq!(config.costing, CostingConfig::default());
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.costing.default_labor_per_unit, Decimal::from(5000));
        assert_eq!(config.queue.batch_size, 10);
    }

    #[test]
    fn test_database_url_falls_back_to_generic_key() {
        let lookup = lookup_from(&[("DATABASE_URL", "postgres://fallback/hpp")]);
        let config = EngineConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://fallback/hpp");
    }

    #[test]
    fn test_missing_database_url() {
        let lookup = lookup_from(&[]);
        let err = EngineConfig::from_lookup(&lookup).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "HPP_DATABASE_URL"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let lookup = lookup_from(&[
            ("HPP_DATABASE_URL", "postgres://localhost/hpp"),
            ("HPP_DEFAULT_LABOR_PER_UNIT", "7500.50"),
            ("HPP_LABOR_KEYWORDS", "Upah, Lembur ,"),
            ("HPP_NEW_RECIPE_OVERHEAD", "default_rate"),
            ("HPP_CALCULATION_TIMEOUT_SECS", "15"),
            ("HPP_TRIGGER_MODE", "Immediate"),
        ]);
        let config = EngineConfig::from_lookup(&lookup).unwrap();

        assert_eq!(config.costing.default_labor_per_unit, Decimal::new(750_050, 2));
        assert_eq!(config.costing.labor_keywords, vec!["upah", "lembur"]);
        assert_eq!(config.costing.new_recipe_overhead, NewRecipeOverhead::DefaultRate);
        assert_eq!(config.queue.calculation_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.queue.trigger_mode, TriggerMode::Immediate);
    }

    #[test]
    fn test_non_positive_batch_size_rejected() {
        let lookup = lookup_from(&[
            ("HPP_DATABASE_URL", "postgres://localhost/hpp"),
            ("HPP_QUEUE_BATCH_SIZE", "0"),
        ]);
        let err = EngineConfig::from_lookup(&lookup).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "HPP_QUEUE_BATCH_SIZE"));
    }

    #[test]
    fn test_invalid_trigger_mode_rejected() {
        let lookup = lookup_from(&[
            ("HPP_DATABASE_URL", "postgres://localhost/hpp"),
            ("HPP_TRIGGER_MODE", "later"),
        ]);
        assert!(EngineConfig::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let lookup = lookup_from(&[("HPP_DATABASE_URL", "postgres://user:hunter2@db/hpp")]);
        let config = EngineConfig::from_lookup(&lookup).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
