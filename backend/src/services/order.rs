//! Sales order totals and stock allocation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    calculate_order_totals, group_order_lines, required_quantities, BatchMovement, Order,
    OrderCharges, OrderItem, OrderLineRow, OrderRow, OrderStatus, OrderTotals,
};
use crate::services::allocation::{
    allocate_in_tx, outstanding_by_batch, release_in_tx, ReleaseResult,
};
use shared::types::Reference;
use shared::{validation, AllocationPlan};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

/// Charges to change before recomputing totals; omitted fields keep their value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecalculateInput {
    pub tax_rate: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub paid_amount: Option<Decimal>,
}

impl RecalculateInput {
    fn apply_to(&self, charges: &OrderCharges) -> OrderCharges {
        OrderCharges {
            tax_rate: self.tax_rate.unwrap_or(charges.tax_rate),
            shipping_cost: self.shipping_cost.unwrap_or(charges.shipping_cost),
            discount_amount: self.discount_amount.unwrap_or(charges.discount_amount),
            paid_amount: self.paid_amount.unwrap_or(charges.paid_amount),
        }
    }

    fn check_amounts(&self) -> AppResult<()> {
        if let Some(rate) = self.tax_rate {
            validation::validate_tax_rate(rate)
                .map_err(|msg| AppError::validation("tax_rate", msg))?;
        }
        let amounts = [
            ("shipping_cost", self.shipping_cost),
            ("discount_amount", self.discount_amount),
            ("paid_amount", self.paid_amount),
        ];
        for (field, amount) in amounts {
            if let Some(amount) = amount {
                validation::validate_money(amount)
                    .map_err(|msg| AppError::validation(field, msg))?;
            }
        }
        Ok(())
    }
}

/// Derived amounts must fit the order's money columns
fn check_totals_fit(totals: &OrderTotals) -> AppResult<()> {
    for amount in [totals.subtotal, totals.total_amount] {
        if amount > validation::MAX_MONEY {
            return Err(AppError::validation("items", "Order total exceeds the supported range"));
        }
    }
    Ok(())
}

/// Stock drawn for every product on an order
#[derive(Debug, Clone, Serialize)]
pub struct OrderAllocation {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub plans: Vec<AllocationPlan>,
    pub movements: Vec<BatchMovement>,
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, tax_rate, shipping_cost, \
     discount_amount, paid_amount, subtotal, tax_amount, total_amount, balance_due, \
     created_at, updated_at";

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get an order with its items
    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        let mut conn = self.db.acquire().await?;
        let row = fetch_order(&mut *conn, order_id, false).await?;
        let items = load_items(&mut *conn, order_id).await?;
        row.into_model(items)
    }

    /// Recompute the derived totals of an order and persist them
    pub async fn recalculate(&self, order_id: Uuid, input: RecalculateInput) -> AppResult<Order> {
        input.validate()?;
        input.check_amounts()?;

        let mut tx = self.db.begin().await?;
        let row = fetch_order(&mut *tx, order_id, true).await?;
        let items = load_items(&mut *tx, order_id).await?;

        let current = row.into_model(items)?;
        let charges = input.apply_to(&current.charges);
        let totals = calculate_order_totals(&current.items, &charges)?;
        check_totals_fit(&totals)?;

        let sql = format!(
            r#"
            UPDATE orders
            SET tax_rate = $2, shipping_cost = $3, discount_amount = $4, paid_amount = $5,
                subtotal = $6, tax_amount = $7, total_amount = $8, balance_due = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let updated = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(charges.tax_rate)
            .bind(charges.shipping_cost)
            .bind(totals.discount_amount)
            .bind(charges.paid_amount)
            .bind(totals.subtotal)
            .bind(totals.tax_amount)
            .bind(totals.total_amount)
            .bind(totals.balance_due)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            total = %totals.total_amount,
            balance_due = %totals.balance_due,
            "Order totals recalculated"
        );

        updated.into_model(current.items)
    }

    /// Allocate stock for every product on an order in one transaction
    pub async fn allocate_order(&self, order_id: Uuid, user_id: Uuid) -> AppResult<OrderAllocation> {
        let mut tx = self.db.begin().await?;
        let row = fetch_order(&mut *tx, order_id, true).await?;
        let items = load_items(&mut *tx, order_id).await?;
        let order = row.into_model(items)?;

        if !order.status.can_allocate() {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot allocate stock for a {} order",
                order.status
            )));
        }

        let reference = Reference::order(order_id);
        if !outstanding_by_batch(&mut *tx, &reference).await?.is_empty() {
            return Err(AppError::Conflict(
                "Order already has allocated stock".to_string(),
            ));
        }

        let required = required_quantities(&order.items);
        if required.is_empty() {
            return Err(AppError::validation("items", "Order has no quantities to allocate"));
        }

        let mut plans = Vec::with_capacity(required.len());
        let mut movements = Vec::new();
        for (product_id, quantity) in required {
            let quantity = i32::try_from(quantity)
                .map_err(|_| AppError::validation("quantity", "Ordered quantity is too large"))?;
            let result = allocate_in_tx(
                &mut *tx,
                product_id,
                quantity,
                &reference,
                Some(format!("Order {}", order.order_number)),
                user_id,
            )
            .await?;
            plans.push(result.plan);
            movements.extend(result.movements);
        }

        let status = if order.status == OrderStatus::Pending {
            OrderStatus::Processing
        } else {
            order.status
        };
        set_status(&mut *tx, order_id, status).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            products = plans.len(),
            movements = movements.len(),
            "Order allocated"
        );

        Ok(OrderAllocation {
            order_id,
            status,
            plans,
            movements,
        })
    }

    /// Return all stock allocated to an order
    pub async fn release_order(&self, order_id: Uuid, user_id: Uuid) -> AppResult<ReleaseResult> {
        let mut tx = self.db.begin().await?;
        let row = fetch_order(&mut *tx, order_id, true).await?;
        let status = OrderStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown order status '{}'", row.status))
        })?;

        if !status.can_release() {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot release stock of a {} order",
                status
            )));
        }

        let result = release_in_tx(&mut *tx, &Reference::order(order_id), user_id).await?;
        tx.commit().await?;

        Ok(result)
    }
}

async fn fetch_order(conn: &mut PgConnection, order_id: Uuid, lock: bool) -> AppResult<OrderRow> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1{}",
        ORDER_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
}

async fn load_items(conn: &mut PgConnection, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, OrderLineRow>(
        r#"
        SELECT oi.id AS order_item_id, oi.product_id, s.size_id, s.quantity, s.price
        FROM order_items oi
        JOIN order_item_sizes s ON s.order_item_id = oi.id
        WHERE oi.order_id = $1
        ORDER BY oi.created_at ASC, oi.id ASC, s.id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(group_order_lines(rows))
}

async fn set_status(conn: &mut PgConnection, order_id: Uuid, status: OrderStatus) -> AppResult<()> {
    sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
