//! Sales order models and derived totals

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// A customer sales order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub charges: OrderCharges,
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Stock can be drawn for orders not yet shipped or cancelled
    pub fn can_allocate(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Stock can be returned until the goods leave the pharmacy
    pub fn can_release(&self) -> bool {
        !matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product line on an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    #[serde(default)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub sizes: Vec<OrderItemSize>,
}

/// Quantity and unit price ordered for one size
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItemSize {
    pub size_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn quantity(&self) -> i64 {
        self.sizes.iter().map(|s| i64::from(s.quantity)).sum()
    }

    /// Sum of `price × quantity` over the sizes, `None` on overflow
    pub fn line_total(&self) -> Option<Decimal> {
        self.sizes.iter().try_fold(Decimal::ZERO, |acc, s| {
            acc.checked_add(s.price.checked_mul(Decimal::from(s.quantity))?)
        })
    }
}

/// Charges entered on the order; everything else is derived
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderCharges {
    /// Percent, e.g. 8.25
    pub tax_rate: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub paid_amount: Decimal,
}

/// Derived monetary fields of an order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderTotalsError {
    #[error("{field} cannot be negative")]
    Negative { field: &'static str },

    #[error("tax rate must be between 0 and 100 percent")]
    TaxRateOutOfRange,

    #[error("order amounts exceed the supported range")]
    Overflow,
}

/// Recompute subtotal, tax, discount, total and balance for an order
pub fn calculate_order_totals(
    items: &[OrderItem],
    charges: &OrderCharges,
) -> Result<OrderTotals, OrderTotalsError> {
    for (field, value) in [
        ("shipping_cost", charges.shipping_cost),
        ("discount_amount", charges.discount_amount),
        ("paid_amount", charges.paid_amount),
    ] {
        if value < Decimal::ZERO {
            return Err(OrderTotalsError::Negative { field });
        }
    }
    if charges.tax_rate < Decimal::ZERO || charges.tax_rate > Decimal::ONE_HUNDRED {
        return Err(OrderTotalsError::TaxRateOutOfRange);
    }

    for size in items.iter().flat_map(|item| item.sizes.iter()) {
        if size.quantity < 0 {
            return Err(OrderTotalsError::Negative { field: "quantity" });
        }
        if size.price < Decimal::ZERO {
            return Err(OrderTotalsError::Negative { field: "price" });
        }
    }

    let subtotal = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total()?))
        .ok_or(OrderTotalsError::Overflow)?;
    let tax_amount = subtotal
        .checked_mul(charges.tax_rate)
        .ok_or(OrderTotalsError::Overflow)?
        / Decimal::ONE_HUNDRED;
    let tax_amount = tax_amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let discount_amount = charges.discount_amount.min(subtotal);
    let total_amount = subtotal
        .checked_add(tax_amount)
        .and_then(|t| t.checked_add(charges.shipping_cost))
        .ok_or(OrderTotalsError::Overflow)?
        - discount_amount;
    let balance_due = (total_amount - charges.paid_amount).max(Decimal::ZERO);

    Ok(OrderTotals {
        subtotal,
        tax_amount,
        shipping_cost: charges.shipping_cost,
        discount_amount,
        total_amount,
        paid_amount: charges.paid_amount,
        balance_due,
    })
}

/// Total units required per product across all items and sizes
pub fn required_quantities(items: &[OrderItem]) -> BTreeMap<Uuid, i64> {
    let mut required = BTreeMap::new();
    for item in items {
        *required.entry(item.product_id).or_insert(0) += item.quantity();
    }
    required.retain(|_, qty| *qty > 0);
    required
}
