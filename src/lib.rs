//! Pallet planning engine and HTTP service.
//!
//! Cartons described by product rows are expanded, screened, optionally stacked
//! into columns and assigned to as few pallets as the greedy heuristic finds.
//! A finished load can be corrected by moving single columns.

pub mod api;
pub mod columns;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod overrides;
pub mod placement;
pub mod sorting;
pub mod types;

pub use error::{PackingError, Result};
pub use optimizer::{OptimizationResult, PackingConfig, PackingMode, optimize};
