//! Integration tests for the HPP engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p hpp-integration-tests
//! ```
//!
//! Tests run the public engine API end to end over
//! [`MemoryStore`](hpp_engine::db::MemoryStore), so no database is needed.
//!
//! # Test Categories
//!
//! - `hpp_calculation` - Calculation results, snapshots and account scoping
//! - `recalculation_queue` - Event fan-out and batch processing
//! - `staleness` - Stale snapshot detection and refresh

use std::sync::Arc;

use chrono::{Duration, Utc};
use hpp_core::{AccountId, IngredientId, RecipeId};
use hpp_engine::HppEngine;
use hpp_engine::config::{CostingConfig, QueueConfig};
use hpp_engine::db::MemoryStore;
use rust_decimal::Decimal;

/// An engine over a fresh in-memory store with one account.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub engine: HppEngine<MemoryStore>,
    pub account: AccountId,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CostingConfig::default(), QueueConfig::default())
    }

    #[must_use]
    pub fn with_config(costing: CostingConfig, queue: QueueConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine = HppEngine::new(Arc::clone(&store), costing, queue);
        Self {
            store,
            engine,
            account: AccountId::generate(),
        }
    }

    /// Seed a small bakery.
    ///
    /// "Roti Manis" makes 10 servings from 2 kg flour at 1000 and 1 kg sugar
    /// at 500. One batch of 10 was completed yesterday with 300 of labor and
    /// rent is 200. Per unit this is material 250, labor 30 and overhead 20,
    /// so `cost_per_unit` is 300.
    #[must_use]
    pub fn seed_bakery(&self) -> Bakery {
        let flour = self
            .store
            .add_ingredient(self.account, "Tepung", "kg", Decimal::from(1000));
        let sugar = self
            .store
            .add_ingredient(self.account, "Gula", "kg", Decimal::from(500));

        let roti = self.store.add_recipe(self.account, "Roti Manis", 10);
        self.store
            .add_recipe_line(self.account, roti, flour, Decimal::from(2), "kg");
        self.store
            .add_recipe_line(self.account, roti, sugar, Decimal::ONE, "kg");

        self.store.add_completed_production(
            self.account,
            roti,
            Decimal::from(10),
            Decimal::from(300),
            Utc::now() - Duration::days(1),
        );
        self.store
            .add_operational_cost(self.account, "Sewa Tempat", Decimal::from(200));

        Bakery { flour, sugar, roti }
    }

    /// Add an active recipe using `ingredient`.
    #[must_use]
    pub fn add_recipe_using(&self, name: &str, servings: i32, ingredient: IngredientId) -> RecipeId {
        let recipe_id = self.store.add_recipe(self.account, name, servings);
        self.store
            .add_recipe_line(self.account, recipe_id, ingredient, Decimal::ONE, "kg");
        recipe_id
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids seeded by [`TestContext::seed_bakery`].
#[derive(Debug, Clone, Copy)]
pub struct Bakery {
    pub flour: IngredientId,
    pub sugar: IngredientId,
    pub roti: RecipeId,
}
