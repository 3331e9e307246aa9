//! Purchase order approval with weighted-average cost recalculation

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    PoDecision, PoStatus, PoStockEffect, ProductSize, PurchaseOrder, PurchaseOrderError,
    PurchaseOrderItem, PurchaseOrderItemRow, PurchaseOrderRow, SizeRow,
};
use shared::{apply_receipt, reverse_receipt, StockPosition};

/// Purchase order service
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: PgPool,
}

/// Outcome of an approve or reject decision
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDecision {
    pub purchase_order: PurchaseOrder,
    pub status: PoStatus,
    /// Sizes whose stock and cost basis changed, empty when only the flags moved
    pub updated_sizes: Vec<ProductSize>,
}

impl PurchaseOrderService {
    /// Create a new PurchaseOrderService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a purchase order with its items
    pub async fn get_purchase_order(&self, po_id: Uuid) -> AppResult<PurchaseOrder> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT id, po_number, supplier_id, po_approved, po_rejected,
                   approved_at, rejected_at, created_at
            FROM purchase_orders
            WHERE id = $1
            "#,
        )
        .bind(po_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let items = load_items(&mut *conn, po_id).await?;

        Ok(row.into_model(items))
    }

    /// Approve a pending purchase order and merge its items into stock
    pub async fn approve(&self, po_id: Uuid, user_id: Uuid) -> AppResult<PurchaseOrderDecision> {
        self.decide(po_id, user_id, PoDecision::Approve).await
    }

    /// Reject a purchase order, reversing its merge if it was approved
    pub async fn reject(&self, po_id: Uuid, user_id: Uuid) -> AppResult<PurchaseOrderDecision> {
        self.decide(po_id, user_id, PoDecision::Reject).await
    }

    async fn decide(
        &self,
        po_id: Uuid,
        user_id: Uuid,
        decision: PoDecision,
    ) -> AppResult<PurchaseOrderDecision> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT id, po_number, supplier_id, po_approved, po_rejected,
                   approved_at, rejected_at, created_at
            FROM purchase_orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(po_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let current = PoStatus::from_flags(row.po_approved, row.po_rejected)?;
        let (next, effect) = match current.decide(decision) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(po_id = %po_id, ?decision, "Purchase order decision refused: {}", err);
                return Err(err.into());
            }
        };

        let items = load_items(&mut *tx, po_id).await?;
        let updated_sizes = match effect {
            PoStockEffect::None => Vec::new(),
            PoStockEffect::Merge | PoStockEffect::Reverse => {
                if items.is_empty() {
                    return Err(PurchaseOrderError::NoItems.into());
                }
                restock_sizes(&mut *tx, &items, effect).await?
            }
        };

        let (po_approved, po_rejected) = next.flags();
        let updated = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            UPDATE purchase_orders
            SET po_approved = $2,
                po_rejected = $3,
                approved_at = CASE WHEN $2 THEN NOW() ELSE approved_at END,
                rejected_at = CASE WHEN $3 THEN NOW() ELSE rejected_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, po_number, supplier_id, po_approved, po_rejected,
                      approved_at, rejected_at, created_at
            "#,
        )
        .bind(po_id)
        .bind(po_approved)
        .bind(po_rejected)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            po_id = %po_id,
            po_number = %updated.po_number,
            user_id = %user_id,
            ?decision,
            sizes_updated = updated_sizes.len(),
            "Purchase order decided"
        );

        Ok(PurchaseOrderDecision {
            purchase_order: updated.into_model(items),
            status: next,
            updated_sizes,
        })
    }
}

async fn load_items(conn: &mut PgConnection, po_id: Uuid) -> AppResult<Vec<PurchaseOrderItem>> {
    let rows = sqlx::query_as::<_, PurchaseOrderItemRow>(
        r#"
        SELECT id, product_id, size_id, quantity, unit_price
        FROM purchase_order_items
        WHERE purchase_order_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(po_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(PurchaseOrderItem::from).collect())
}

/// Lock the sizes referenced by `items`, fold the items into their stock
/// positions and write the results back
async fn restock_sizes(
    conn: &mut PgConnection,
    items: &[PurchaseOrderItem],
    effect: PoStockEffect,
) -> AppResult<Vec<ProductSize>> {
    let mut size_ids: Vec<Uuid> = items.iter().map(|item| item.size_id).collect();
    size_ids.sort();
    size_ids.dedup();

    let rows = sqlx::query_as::<_, SizeRow>(
        r#"
        SELECT id, product_id, size_value, size_unit, price, stock, cost_price
        FROM product_sizes
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(&size_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut sizes: BTreeMap<Uuid, ProductSize> = rows
        .into_iter()
        .map(|row| (row.id, ProductSize::from(row)))
        .collect();

    let positions = apply_items(&mut sizes, items, effect)?;

    let mut updated = Vec::with_capacity(positions.len());
    for (size_id, position) in positions {
        let row = sqlx::query_as::<_, SizeRow>(
            r#"
            UPDATE product_sizes
            SET stock = $2, cost_price = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, product_id, size_value, size_unit, price, stock, cost_price
            "#,
        )
        .bind(size_id)
        .bind(position.quantity)
        .bind(position.cost_per_unit)
        .fetch_one(&mut *conn)
        .await?;
        updated.push(ProductSize::from(row));
    }

    Ok(updated)
}

/// Apply every item to its size in memory. Reversal walks the items backwards
/// so a size listed on several lines unwinds in the opposite order it was built.
fn apply_items(
    sizes: &mut BTreeMap<Uuid, ProductSize>,
    items: &[PurchaseOrderItem],
    effect: PoStockEffect,
) -> AppResult<BTreeMap<Uuid, StockPosition>> {
    let ordered: Vec<&PurchaseOrderItem> = match effect {
        PoStockEffect::Reverse => items.iter().rev().collect(),
        _ => items.iter().collect(),
    };

    let mut positions = BTreeMap::new();
    for item in ordered {
        let size = sizes
            .get_mut(&item.size_id)
            .ok_or_else(|| AppError::NotFound(format!("Product size {}", item.size_id)))?;
        let position = match effect {
            PoStockEffect::Merge => {
                apply_receipt(size.stock_position(), size.price, item.unit_price, item.quantity)?
            }
            PoStockEffect::Reverse => {
                reverse_receipt(size.stock_position(), size.price, item.unit_price, item.quantity)?
            }
            PoStockEffect::None => size.stock_position(),
        };
        size.stock = position.quantity;
        size.cost_price = position.cost_per_unit;
        positions.insert(item.size_id, position);
    }

    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn size(stock: i32, cost: Option<&str>, price: &str) -> ProductSize {
        ProductSize {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            size_value: "30".to_string(),
            size_unit: Some("tablets".to_string()),
            price: dec(price),
            stock,
            cost_price: cost.map(dec),
        }
    }

    fn item(size: &ProductSize, quantity: i32, price: &str) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: Uuid::new_v4(),
            product_id: size.product_id,
            size_id: size.id,
            quantity,
            unit_price: dec(price),
        }
    }

    #[test]
    fn test_merge_then_reverse_restores_sizes() {
        let a = size(40, Some("2.50"), "6");
        let b = size(0, None, "9");
        let items = vec![item(&a, 10, "3"), item(&b, 5, "4"), item(&a, 20, "2")];
        let mut sizes: BTreeMap<Uuid, ProductSize> =
            [(a.id, a.clone()), (b.id, b.clone())].into_iter().collect();

        let merged = apply_items(&mut sizes, &items, PoStockEffect::Merge).unwrap();
        assert_eq!(merged[&a.id].quantity, 70);
        assert_eq!(merged[&b.id].quantity, 5);
        assert_eq!(merged[&b.id].cost_per_unit, Some(dec("4")));

        let reversed = apply_items(&mut sizes, &items, PoStockEffect::Reverse).unwrap();
        assert_eq!(reversed[&a.id].quantity, 40);
        let diff = (reversed[&a.id].cost_per_unit.unwrap() - dec("2.50")).abs();
        assert!(diff < dec("0.000001"));
        assert_eq!(reversed[&b.id].quantity, 0);
        assert_eq!(reversed[&b.id].cost_per_unit, None);
    }

    #[test]
    fn test_missing_size_is_not_found() {
        let a = size(1, None, "1");
        let mut sizes = BTreeMap::new();
        let result = apply_items(&mut sizes, &[item(&a, 1, "1")], PoStockEffect::Merge);
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_reversal_of_consumed_stock_fails() {
        let a = size(3, Some("5"), "8");
        let mut sizes: BTreeMap<Uuid, ProductSize> = [(a.id, a.clone())].into_iter().collect();
        let result = apply_items(&mut sizes, &[item(&a, 10, "5")], PoStockEffect::Reverse);
        assert!(matches!(
            result,
            Err(AppError::InsufficientStock {
                requested: 10,
                available: 3,
                ..
            })
        ));
    }
}
