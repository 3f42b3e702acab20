//! HPP engine.
//!
//! Computes the cost of production (HPP, *harga pokok produksi*) of recipes
//! and keeps it current as upstream costs change.
//!
//! # Architecture
//!
//! ```text
//! CostEvent -> RecalculationQueue -> (queue items) -> HppCalculator -> CostStore
//!                                                        |-- LaborEstimator
//!                                                        |-- OverheadAllocator
//!                                                        `-- WacCalculator
//! ```
//!
//! All persistence goes through the [`db::CostStore`] and [`db::QueueStore`]
//! traits. [`db::PgStore`] is the production implementation and
//! [`db::MemoryStore`] backs the tests.
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`db`] - Store contracts and implementations
//! - [`error`] - Service error type
//! - [`models`] - Domain models
//! - [`money`] - Checked decimal arithmetic
//! - [`services`] - Calculation, queue and staleness services

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod services;

use std::sync::Arc;

use config::{CostingConfig, EngineConfig, QueueConfig};
use db::{CostStore, PgStore, QueueStore};
use services::{HppCalculator, RecalculationQueue, StalenessAuditor, WacCalculator};

pub use error::{HppError, Result};

/// Wires the services over one shared store.
pub struct HppEngine<S> {
    store: Arc<S>,
    costing: Arc<CostingConfig>,
    queue_config: Arc<QueueConfig>,
    calculator: HppCalculator<S>,
    queue: RecalculationQueue<S>,
    staleness: StalenessAuditor<S>,
}

impl<S: CostStore + QueueStore> HppEngine<S> {
    /// Build the services over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, costing: CostingConfig, queue_config: QueueConfig) -> Self {
        let costing = Arc::new(costing);
        let queue_config = Arc::new(queue_config);
        let calculator = HppCalculator::new(Arc::clone(&store), Arc::clone(&costing));
        let queue = RecalculationQueue::new(
            Arc::clone(&store),
            calculator.clone(),
            Arc::clone(&queue_config),
        );
        let staleness = StalenessAuditor::new(Arc::clone(&store), calculator.clone());

        Self {
            store,
            costing,
            queue_config,
            calculator,
            queue,
            staleness,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn queue_config(&self) -> &QueueConfig {
        &self.queue_config
    }

    #[must_use]
    pub const fn calculator(&self) -> &HppCalculator<S> {
        &self.calculator
    }

    #[must_use]
    pub const fn queue(&self) -> &RecalculationQueue<S> {
        &self.queue
    }

    #[must_use]
    pub const fn staleness(&self) -> &StalenessAuditor<S> {
        &self.staleness
    }

    /// Ingredient WAC lookups.
    #[must_use]
    pub fn wac(&self) -> WacCalculator<'_, S> {
        WacCalculator::new(self.store.as_ref(), self.costing.as_ref())
    }
}

impl HppEngine<PgStore> {
    /// Connect to Postgres and build the services.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the pool cannot be created.
    pub async fn connect(config: &EngineConfig) -> std::result::Result<Self, sqlx::Error> {
        let pool = db::create_pool(&config.database_url).await?;
        Ok(Self::new(
            Arc::new(PgStore::new(pool)),
            config.costing.clone(),
            config.queue.clone(),
        ))
    }
}
