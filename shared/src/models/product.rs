//! Product and size models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{BatchStatus, ProductBatch};
use crate::costing::StockPosition;

/// A sellable product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub sizes: Vec<ProductSize>,
}

/// A size/pack variant of a product, carrying its own stock and cost basis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSize {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_value: String,
    pub size_unit: Option<String>,
    /// Selling price
    pub price: Decimal,
    pub stock: i32,
    /// Weighted-average purchase cost; `None` until a cost is recorded
    pub cost_price: Option<Decimal>,
}

impl ProductSize {
    pub fn stock_position(&self) -> StockPosition {
        StockPosition {
            quantity: self.stock,
            cost_per_unit: self.cost_price,
        }
    }
}

/// Batch stock of a product broken down by status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockSummary {
    pub product_id: Uuid,
    pub total_quantity: i64,
    /// Quantity FEFO allocation may draw from today
    pub allocatable_quantity: i64,
    pub by_status: BTreeMap<BatchStatus, i64>,
    pub batch_count: usize,
}

/// Summarize the batches of one product
pub fn summarize_stock(
    product_id: Uuid,
    batches: &[ProductBatch],
    today: chrono::NaiveDate,
) -> StockSummary {
    let mut by_status: BTreeMap<BatchStatus, i64> = BatchStatus::ALL
        .iter()
        .map(|status| (*status, 0))
        .collect();
    let mut total_quantity = 0i64;
    let mut allocatable_quantity = 0i64;
    let mut batch_count = 0usize;

    for batch in batches.iter().filter(|b| b.product_id == product_id) {
        let qty = i64::from(batch.quantity);
        *by_status.entry(batch.status).or_insert(0) += qty;
        total_quantity += qty;
        if batch.is_allocatable(today) {
            allocatable_quantity += qty;
        }
        batch_count += 1;
    }

    StockSummary {
        product_id,
        total_quantity,
        allocatable_quantity,
        by_status,
        batch_count,
    }
}
