//! Domain models for pharmacy batch inventory

mod batch;
mod movement;
mod order;
mod product;
mod purchase_order;

pub use batch::*;
pub use movement::*;
pub use order::*;
pub use product::*;
pub use purchase_order::*;
