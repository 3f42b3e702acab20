//! Costing services.
//!
//! # Services
//!
//! - `calculator` - HPP calculation and snapshot persistence
//! - `labor` - Tiered labor cost estimation
//! - `overhead` - Overhead allocation by production volume
//! - `wac` - Weighted average cost adjustment and history
//! - `alerts` - Cost change and margin alerts
//! - `queue` - Event fan-out and batch recalculation
//! - `staleness` - Stale snapshot detection and refresh

pub mod alerts;
pub mod calculator;
pub mod labor;
pub mod overhead;
pub mod queue;
pub mod staleness;
pub mod wac;

pub use alerts::{AlertKind, AlertSeverity, HppAlert};
pub use calculator::{BatchOutcome, CostBreakdown, HppCalculationResult, HppCalculator, RecipeFailure};
pub use labor::{LaborEstimate, LaborEstimator, LaborTier};
pub use overhead::{OverheadAllocation, OverheadAllocator, OverheadMethod};
pub use queue::{CostEvent, ProcessOutcome, QueueStatus, RecalculationQueue, TriggerOutcome};
pub use staleness::{StaleRecipe, StalenessAuditor};
pub use wac::{IngredientWacDelta, WacAdjustment, WacCalculator, WacLine, WacPoint};
