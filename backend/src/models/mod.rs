//! Database models for the Pharmacy Order Management server
//!
//! Re-exports models from the shared crate and adds the row types sqlx maps
//! query results into. Status columns are stored as text and parsed on the way
//! out so an unknown value surfaces as an error instead of a panic.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

pub use shared::models::*;

/// Columns selected for every `product_batches` query
pub const BATCH_COLUMNS: &str = "id, product_id, batch_number, lot_number, manufacturing_date, \
     expiry_date, quantity, cost_per_unit, supplier_id, status, notes, created_at, updated_at";

/// Columns selected for every `batch_movements` query
pub const MOVEMENT_COLUMNS: &str = "id, batch_id, movement_type, quantity, reference_id, \
     reference_type, notes, created_by, created_at";

#[derive(Debug, FromRow)]
pub struct BatchRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_number: String,
    pub lot_number: Option<String>,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: NaiveDate,
    pub quantity: i32,
    pub cost_per_unit: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for ProductBatch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let status = BatchStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown batch status '{}'", row.status))
        })?;
        Ok(ProductBatch {
            id: row.id,
            product_id: row.product_id,
            batch_number: row.batch_number,
            lot_number: row.lot_number,
            manufacturing_date: row.manufacturing_date,
            expiry_date: row.expiry_date,
            quantity: row.quantity,
            cost_per_unit: row.cost_per_unit,
            supplier_id: row.supplier_id,
            status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MovementRow {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub movement_type: String,
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for BatchMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::parse(&row.movement_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown movement type '{}'", row.movement_type))
        })?;
        Ok(BatchMovement {
            id: row.id,
            batch_id: row.batch_id,
            movement_type,
            quantity: row.quantity,
            reference_id: row.reference_id,
            reference_type: row.reference_type,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Convert a list of rows, failing on the first bad one
pub fn convert_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Debug, FromRow)]
pub struct SizeRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_value: String,
    pub size_unit: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub cost_price: Option<Decimal>,
}

impl From<SizeRow> for ProductSize {
    fn from(row: SizeRow) -> Self {
        ProductSize {
            id: row.id,
            product_id: row.product_id,
            size_value: row.size_value,
            size_unit: row.size_unit,
            price: row.price,
            stock: row.stock,
            cost_price: row.cost_price,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PurchaseOrderRow {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Option<Uuid>,
    pub po_approved: bool,
    pub po_rejected: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrderRow {
    pub fn into_model(self, items: Vec<PurchaseOrderItem>) -> PurchaseOrder {
        PurchaseOrder {
            id: self.id,
            po_number: self.po_number,
            supplier_id: self.supplier_id,
            po_approved: self.po_approved,
            po_rejected: self.po_rejected,
            items,
            approved_at: self.approved_at,
            rejected_at: self.rejected_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PurchaseOrderItemRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl From<PurchaseOrderItemRow> for PurchaseOrderItem {
    fn from(row: PurchaseOrderItemRow) -> Self {
        PurchaseOrderItem {
            id: row.id,
            product_id: row.product_id,
            size_id: row.size_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub tax_rate: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub paid_amount: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub balance_due: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_model(self, items: Vec<OrderItem>) -> Result<Order, AppError> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown order status '{}'", self.status))
        })?;
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            status,
            items,
            charges: OrderCharges {
                tax_rate: self.tax_rate,
                shipping_cost: self.shipping_cost,
                discount_amount: self.discount_amount,
                paid_amount: self.paid_amount,
            },
            totals: OrderTotals {
                subtotal: self.subtotal,
                tax_amount: self.tax_amount,
                shipping_cost: self.shipping_cost,
                discount_amount: self.discount_amount,
                total_amount: self.total_amount,
                paid_amount: self.paid_amount,
                balance_due: self.balance_due,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// One size line of an order item, joined with its item
#[derive(Debug, FromRow)]
pub struct OrderLineRow {
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub size_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// Group joined size lines back into order items, keeping first-seen order
pub fn group_order_lines(rows: Vec<OrderLineRow>) -> Vec<OrderItem> {
    let mut items: Vec<OrderItem> = Vec::new();
    for row in rows {
        let size = OrderItemSize {
            size_id: row.size_id,
            quantity: row.quantity,
            price: row.price,
        };
        match items.iter_mut().find(|item| item.id == row.order_item_id) {
            Some(item) => item.sizes.push(size),
            None => items.push(OrderItem {
                id: row.order_item_id,
                product_id: row.product_id,
                sizes: vec![size],
            }),
        }
    }
    items
}
