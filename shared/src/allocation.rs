//! FEFO (first-expired-first-out) allocation planning
//!
//! Planning is pure: it decides which batches to draw from and how much,
//! without touching storage. The backend locks the same batches, plans against
//! the locked rows and writes the resulting movements in one transaction, so a
//! shortfall never leaves a partial allocation behind.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ProductBatch;

/// Quantity drawn from one batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationLine {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: i32,
    pub remaining_after: i32,
}

/// Full allocation of a requested quantity across batches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationPlan {
    pub product_id: Uuid,
    pub requested: i32,
    pub lines: Vec<AllocationLine>,
}

impl AllocationPlan {
    pub fn total_allocated(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }

    /// Batches the plan empties completely
    pub fn depleted_batches(&self) -> impl Iterator<Item = &AllocationLine> {
        self.lines.iter().filter(|l| l.remaining_after == 0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("requested quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i64,
        available: i64,
    },
}

/// FEFO ordering: earliest expiry first, then oldest receipt, then batch number
pub fn fefo_order(a: &ProductBatch, b: &ProductBatch) -> Ordering {
    a.expiry_date
        .cmp(&b.expiry_date)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.batch_number.cmp(&b.batch_number))
}

/// Batches of `product_id` that allocation may draw from, in FEFO order
pub fn eligible_batches<'a>(
    product_id: Uuid,
    batches: &'a [ProductBatch],
    today: NaiveDate,
) -> Vec<&'a ProductBatch> {
    let mut eligible: Vec<&ProductBatch> = batches
        .iter()
        .filter(|b| b.product_id == product_id && b.is_allocatable(today))
        .collect();
    eligible.sort_by(|a, b| fefo_order(a, b));
    eligible
}

/// Plan a FEFO allocation of `required` units of a product.
///
/// Fails with [`AllocationError::InsufficientStock`] if the eligible batches
/// together hold less than `required`; no partial plan is returned.
pub fn plan_fefo_allocation(
    product_id: Uuid,
    batches: &[ProductBatch],
    required: i32,
    today: NaiveDate,
) -> Result<AllocationPlan, AllocationError> {
    if required <= 0 {
        return Err(AllocationError::InvalidQuantity(i64::from(required)));
    }

    let eligible = eligible_batches(product_id, batches, today);
    let available: i64 = eligible.iter().map(|b| i64::from(b.quantity)).sum();
    if available < i64::from(required) {
        return Err(AllocationError::InsufficientStock {
            product_id,
            requested: i64::from(required),
            available,
        });
    }

    let mut outstanding = required;
    let mut lines = Vec::new();
    for batch in eligible {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(batch.quantity);
        lines.push(AllocationLine {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            expiry_date: batch.expiry_date,
            quantity: take,
            remaining_after: batch.quantity - take,
        });
        outstanding -= take;
    }

    Ok(AllocationPlan {
        product_id,
        requested: required,
        lines,
    })
}
