//! # Skirmish Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Fixture maps, unit layouts and tick drivers
//! - Determinism harness
//! - Movement invariant checks
//! - Property-based testing strategies
//! - Declarative scenario runner

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod invariants;
pub mod scenario;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
