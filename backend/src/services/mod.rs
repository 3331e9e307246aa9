//! Business logic services for the Pharmacy Order Management server

pub mod allocation;
pub mod batch;
pub mod export;
pub mod order;
pub mod purchase_order;

pub use allocation::AllocationService;
pub use batch::BatchService;
pub use order::OrderService;
pub use purchase_order::PurchaseOrderService;
