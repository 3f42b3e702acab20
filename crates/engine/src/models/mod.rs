//! Domain models for the HPP engine.
//!
//! Rows owned by other parts of the system (recipes, ingredients, productions,
//! operational costs, stock transactions) are read-only here, apart from the
//! cached `cost_per_unit` on a recipe. Calculation snapshots and queue items
//! are written by the engine itself.

pub mod costs;
pub mod hpp;
pub mod queue;
pub mod recipe;

pub use costs::{OperationalCost, Production, ProductionQuery, PurchaseQuery, StockTransaction};
pub use hpp::{HppCalculation, MaterialLine, NewHppCalculation};
pub use queue::{NewQueueItem, QueueCounts, RecalculationQueueItem};
pub use recipe::{Ingredient, Recipe, RecipeIngredient, RecipeWithIngredients};
