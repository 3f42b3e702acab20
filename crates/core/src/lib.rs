//! HPP Core - Shared types library.
//!
//! This crate provides common types used across the HPP workspace:
//! - `engine` - Cost calculation, recalculation queue and staleness audit
//! - `cli` - Operator commands for migrations, queue processing and audits
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access.
//! Database encoding is available behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
