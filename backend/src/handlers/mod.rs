//! HTTP handlers for the Pharmacy Order Management API

pub mod allocation;
pub mod batch;
pub mod health;
pub mod order;
pub mod purchase_order;

pub use allocation::*;
pub use batch::*;
pub use health::*;
pub use order::*;
pub use purchase_order::*;
