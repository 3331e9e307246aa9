//! Shared types and calculations for the Pharmacy Order Management platform
//!
//! This crate holds the batch inventory domain used by the backend server
//! and by the dashboard through the WASM module: batches and their movement
//! ledger, FEFO allocation planning, weighted-average costing and order totals.

pub mod allocation;
pub mod costing;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::*;
pub use costing::*;
pub use models::*;
pub use types::*;
pub use validation::*;
