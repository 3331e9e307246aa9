//! Batch inventory service: receipts, the movement ledger and batch lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    convert_rows, fold_ledger, summarize_stock, BatchMovement, BatchRow, BatchStatus,
    LedgerSummary, MovementEffect, MovementRow, MovementType, ProductBatch, StockSummary,
    BATCH_COLUMNS, MOVEMENT_COLUMNS,
};
use shared::types::{DateRange, Reference};
use shared::validation;

/// Row lock order shared by every path that locks more than one batch.
/// Order allocation visits products in id order, so product leads.
const FEFO_LOCK_ORDER: &str =
    "product_id ASC, expiry_date ASC, created_at ASC, batch_number ASC, id ASC";

/// Batch service for receiving stock and recording ledger movements
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

/// Input for receiving a new batch
#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveBatchInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub batch_number: String,
    #[validate(length(max = 64))]
    pub lot_number: Option<String>,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: NaiveDate,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub cost_per_unit: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    /// Purchase order the goods arrived on, if any
    pub purchase_order_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Input for a manual ledger movement
#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementInput {
    pub movement_type: MovementType,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub reference_type: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Input for a manual status change
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusInput {
    pub status: BatchStatus,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Filters for listing batches
#[derive(Debug, Default, Deserialize)]
pub struct BatchFilter {
    pub product_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
}

/// Recorded quantity compared with the ledger fold
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub recorded_quantity: i32,
    pub ledger: LedgerSummary,
    pub consistent: bool,
}

/// Batch expiring inside the look-ahead window
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringBatch {
    #[serde(flatten)]
    pub batch: ProductBatch,
    pub days_until_expiry: i64,
}

/// Flat movement record for CSV export
#[derive(Debug, Serialize)]
pub struct MovementExportRow {
    pub created_at: DateTime<Utc>,
    pub batch_number: String,
    pub movement_type: String,
    pub quantity: i32,
    pub signed_quantity: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// A movement about to be written
#[derive(Debug, Clone)]
pub(crate) struct MovementDraft {
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference: Option<Reference>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive a batch and record its initial receipt movement
    pub async fn receive_batch(
        &self,
        user_id: Uuid,
        input: ReceiveBatchInput,
    ) -> AppResult<ProductBatch> {
        input.validate()?;
        validation::validate_batch_number(&input.batch_number)
            .map_err(|msg| AppError::validation("batch_number", msg))?;
        validation::validate_batch_dates(input.manufacturing_date, input.expiry_date)
            .map_err(|msg| AppError::validation("manufacturing_date", msg))?;
        validation::validate_not_expired(input.expiry_date, today())
            .map_err(|msg| AppError::validation("expiry_date", msg))?;
        if let Some(cost) = input.cost_per_unit {
            validation::validate_money(cost)
                .map_err(|msg| AppError::validation("cost_per_unit", msg))?;
        }

        let mut tx = self.db.begin().await?;

        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(input.product_id)
                .fetch_one(&mut *tx)
                .await?;
        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let duplicate = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_batches WHERE product_id = $1 AND batch_number = $2)",
        )
        .bind(input.product_id)
        .bind(input.batch_number.trim())
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(AppError::Conflict(format!(
                "Batch {} already exists for this product",
                input.batch_number.trim()
            )));
        }

        let sql = format!(
            r#"
            INSERT INTO product_batches (
                product_id, batch_number, lot_number, manufacturing_date, expiry_date,
                quantity, cost_per_unit, supplier_id, status, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        );
        let batch: ProductBatch = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(input.product_id)
            .bind(input.batch_number.trim())
            .bind(&input.lot_number)
            .bind(input.manufacturing_date)
            .bind(input.expiry_date)
            .bind(input.quantity)
            .bind(input.cost_per_unit)
            .bind(input.supplier_id)
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::conflict_on_duplicate(
                    e,
                    format!(
                        "Batch {} already exists for this product",
                        input.batch_number.trim()
                    ),
                )
            })?
            .try_into()?;

        let draft = MovementDraft {
            movement_type: MovementType::Receipt,
            quantity: input.quantity,
            reference: input.purchase_order_id.map(Reference::purchase_order),
            notes: Some("Initial receipt".to_string()),
            created_by: Some(user_id),
        };
        insert_movement(&mut *tx, batch.id, &draft).await?;

        tx.commit().await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity,
            "Batch received"
        );

        Ok(batch)
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<ProductBatch> {
        let sql = format!("SELECT {} FROM product_batches WHERE id = $1", BATCH_COLUMNS);
        sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?
            .try_into()
    }

    /// List batches in FEFO order
    pub async fn list_batches(&self, filter: BatchFilter) -> AppResult<Vec<ProductBatch>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM product_batches
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY expiry_date ASC, created_at ASC, batch_number ASC
            "#,
            BATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(filter.product_id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.db)
            .await?;

        convert_rows(rows)
    }

    /// Record a manual movement against a batch
    ///
    /// Receipts are written when a batch is received and sales by allocation,
    /// so neither is accepted here.
    pub async fn record_movement(
        &self,
        batch_id: Uuid,
        user_id: Uuid,
        input: RecordMovementInput,
    ) -> AppResult<BatchMovement> {
        input.validate()?;
        if matches!(
            input.movement_type,
            MovementType::Receipt | MovementType::Sale
        ) {
            return Err(AppError::validation(
                "movement_type",
                format!(
                    "{} movements cannot be recorded manually",
                    input.movement_type
                ),
            ));
        }
        if input.reference_id.is_some() != input.reference_type.is_some() {
            return Err(AppError::validation(
                "reference_type",
                "reference_type and reference_id must be given together",
            ));
        }

        let draft = MovementDraft {
            movement_type: input.movement_type,
            quantity: input.quantity,
            reference: match (input.reference_type, input.reference_id) {
                (Some(reference_type), Some(reference_id)) => Some(Reference {
                    reference_type,
                    reference_id,
                }),
                _ => None,
            },
            notes: input.notes,
            created_by: Some(user_id),
        };

        let mut tx = self.db.begin().await?;
        let batch = lock_batch(&mut *tx, batch_id).await?;
        let (updated, movement) = apply_batch_movement(&mut *tx, &batch, &draft, today()).await?;
        tx.commit().await?;

        tracing::info!(
            batch_id = %batch_id,
            movement_type = %movement.movement_type,
            quantity = movement.quantity,
            quantity_after = updated.quantity,
            status = %updated.status,
            "Batch movement recorded"
        );

        Ok(movement)
    }

    /// List the ledger of a batch, oldest first
    pub async fn list_movements(&self, batch_id: Uuid) -> AppResult<Vec<BatchMovement>> {
        self.ensure_batch_exists(batch_id).await?;

        let sql = format!(
            "SELECT {} FROM batch_movements WHERE batch_id = $1 ORDER BY created_at ASC, id ASC",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(batch_id)
            .fetch_all(&self.db)
            .await?;

        convert_rows(rows)
    }

    /// Ledger of a batch flattened for CSV export
    pub async fn export_movements(&self, batch_id: Uuid) -> AppResult<Vec<MovementExportRow>> {
        let batch = self.get_batch(batch_id).await?;
        let movements = self.list_movements(batch_id).await?;

        Ok(movements
            .into_iter()
            .map(|m| MovementExportRow {
                created_at: m.created_at,
                batch_number: batch.batch_number.clone(),
                movement_type: m.movement_type.to_string(),
                quantity: m.quantity,
                signed_quantity: m.movement_type.signed(m.quantity),
                reference_type: m.reference_type,
                reference_id: m.reference_id,
                notes: m.notes,
            })
            .collect())
    }

    /// Compare the stored quantity of a batch with the fold of its ledger
    pub async fn reconcile_batch(&self, batch_id: Uuid) -> AppResult<ReconcileReport> {
        let batch = self.get_batch(batch_id).await?;
        let movements = self.list_movements(batch_id).await?;

        let ledger = fold_ledger(movements.iter().map(|m| (m.movement_type, m.quantity)));
        let consistent = ledger.balance == i64::from(batch.quantity);
        if !consistent {
            tracing::warn!(
                batch_id = %batch_id,
                recorded = batch.quantity,
                ledger = ledger.balance,
                "Batch quantity does not match its ledger"
            );
        }

        Ok(ReconcileReport {
            batch_id,
            batch_number: batch.batch_number,
            recorded_quantity: batch.quantity,
            ledger,
            consistent,
        })
    }

    /// Apply a manual status change
    pub async fn update_status(
        &self,
        batch_id: Uuid,
        user_id: Uuid,
        input: UpdateStatusInput,
    ) -> AppResult<ProductBatch> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let batch = lock_batch(&mut *tx, batch_id).await?;
        batch.validate_status_change(input.status)?;

        let sql = format!(
            r#"
            UPDATE product_batches
            SET status = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BATCH_COLUMNS
        );
        let updated: ProductBatch = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch_id)
            .bind(input.status.as_str())
            .bind(&input.notes)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
        tx.commit().await?;

        tracing::info!(
            batch_id = %batch_id,
            user_id = %user_id,
            from = %batch.status,
            to = %updated.status,
            "Batch status changed"
        );

        Ok(updated)
    }

    /// Mark every non-terminal batch whose expiry date has been reached as expired
    pub async fn expire_batches(&self) -> AppResult<Vec<ProductBatch>> {
        let sql = format!(
            r#"
            UPDATE product_batches
            SET status = 'expired', updated_at = NOW()
            WHERE expiry_date <= $1
              AND status IN ('active', 'quarantine', 'depleted')
            RETURNING {}
            "#,
            BATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(today())
            .fetch_all(&self.db)
            .await?;
        let expired: Vec<ProductBatch> = convert_rows(rows)?;

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired batches swept");
        }

        Ok(expired)
    }

    /// Active batches with stock that expire within `days`
    pub async fn expiring_soon(&self, days: i64) -> AppResult<Vec<ExpiringBatch>> {
        validation::validate_expiry_window(days)
            .map_err(|msg| AppError::validation("days", msg))?;

        let today = today();
        let window = DateRange::ahead(today, days);
        let sql = format!(
            r#"
            SELECT {}
            FROM product_batches
            WHERE status = 'active'
              AND quantity > 0
              AND expiry_date > $1
              AND expiry_date <= $2
            ORDER BY expiry_date ASC, created_at ASC, batch_number ASC
            "#,
            BATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.db)
            .await?;
        let batches: Vec<ProductBatch> = convert_rows(rows)?;

        Ok(batches
            .into_iter()
            .map(|batch| ExpiringBatch {
                days_until_expiry: batch.days_until_expiry(today),
                batch,
            })
            .collect())
    }

    /// Batch stock of a product broken down by status
    pub async fn product_stock(&self, product_id: Uuid) -> AppResult<StockSummary> {
        let product_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;
        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let batches = self
            .list_batches(BatchFilter {
                product_id: Some(product_id),
                status: None,
            })
            .await?;

        Ok(summarize_stock(product_id, &batches, today()))
    }

    async fn ensure_batch_exists(&self, batch_id: Uuid) -> AppResult<()> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM product_batches WHERE id = $1)")
                .bind(batch_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::NotFound("Batch".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

/// Lock one batch for the rest of the transaction
pub(crate) async fn lock_batch(conn: &mut PgConnection, batch_id: Uuid) -> AppResult<ProductBatch> {
    let sql = format!(
        "SELECT {} FROM product_batches WHERE id = $1 FOR UPDATE",
        BATCH_COLUMNS
    );
    sqlx::query_as::<_, BatchRow>(&sql)
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?
        .try_into()
}

fn lock_batches_sql() -> String {
    format!(
        "SELECT {} FROM product_batches WHERE id = ANY($1) ORDER BY {} FOR UPDATE",
        BATCH_COLUMNS, FEFO_LOCK_ORDER
    )
}

fn lock_allocatable_batches_sql() -> String {
    format!(
        r#"
        SELECT {}
        FROM product_batches
        WHERE product_id = $1
          AND status = 'active'
          AND quantity > 0
          AND expiry_date > $2
        ORDER BY {}
        FOR UPDATE
        "#,
        BATCH_COLUMNS, FEFO_LOCK_ORDER
    )
}

/// Lock several batches in FEFO order, the same order allocation locks them in
pub(crate) async fn lock_batches(
    conn: &mut PgConnection,
    batch_ids: &[Uuid],
) -> AppResult<Vec<ProductBatch>> {
    let sql = lock_batches_sql();
    let rows = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(batch_ids)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

/// Lock the batches of a product that allocation may draw from, in FEFO order
pub(crate) async fn lock_allocatable_batches(
    conn: &mut PgConnection,
    product_id: Uuid,
    today: NaiveDate,
) -> AppResult<Vec<ProductBatch>> {
    let sql = lock_allocatable_batches_sql();
    let rows = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(product_id)
        .bind(today)
        .fetch_all(&mut *conn)
        .await?;

    convert_rows(rows)
}

/// Append a movement to the ledger
pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    batch_id: Uuid,
    draft: &MovementDraft,
) -> AppResult<BatchMovement> {
    let sql = format!(
        r#"
        INSERT INTO batch_movements (
            batch_id, movement_type, quantity, reference_id, reference_type, notes, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        MOVEMENT_COLUMNS
    );
    sqlx::query_as::<_, MovementRow>(&sql)
        .bind(batch_id)
        .bind(draft.movement_type.as_str())
        .bind(draft.quantity)
        .bind(draft.reference.as_ref().map(|r| r.reference_id))
        .bind(draft.reference.as_ref().map(|r| r.reference_type.as_str()))
        .bind(&draft.notes)
        .bind(draft.created_by)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

async fn update_batch_stock(
    conn: &mut PgConnection,
    batch_id: Uuid,
    effect: MovementEffect,
) -> AppResult<ProductBatch> {
    let sql = format!(
        r#"
        UPDATE product_batches
        SET quantity = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        BATCH_COLUMNS
    );
    sqlx::query_as::<_, BatchRow>(&sql)
        .bind(batch_id)
        .bind(effect.quantity_after)
        .bind(effect.status_after.as_str())
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

/// Write one movement against a locked batch and update its quantity and status
pub(crate) async fn apply_batch_movement(
    conn: &mut PgConnection,
    batch: &ProductBatch,
    draft: &MovementDraft,
    today: NaiveDate,
) -> AppResult<(ProductBatch, BatchMovement)> {
    let effect = batch.apply_movement(draft.movement_type, draft.quantity, today)?;
    let movement = insert_movement(conn, batch.id, draft).await?;
    let updated = update_batch_stock(conn, batch.id, effect).await?;
    Ok((updated, movement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_input_validation() {
        let input = ReceiveBatchInput {
            product_id: Uuid::new_v4(),
            batch_number: String::new(),
            lot_number: None,
            manufacturing_date: None,
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            quantity: 0,
            cost_per_unit: None,
            supplier_id: None,
            purchase_order_id: None,
            notes: None,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("batch_number"));
        assert!(fields.contains_key("quantity"));
    }

    #[test]
    fn test_multi_batch_locks_share_fefo_order() {
        let by_id = lock_batches_sql();
        let allocatable = lock_allocatable_batches_sql();
        for sql in [&by_id, &allocatable] {
            let order = sql.split("ORDER BY").nth(1).unwrap();
            assert!(order.trim_start().starts_with(FEFO_LOCK_ORDER));
            assert!(order.contains("FOR UPDATE"));
        }
        assert!(!by_id.contains("ORDER BY id FOR UPDATE"));
    }

    #[test]
    fn test_movement_input_deserializes_type() {
        let input: RecordMovementInput = serde_json::from_str(
            r#"{"movement_type": "disposal", "quantity": 3, "notes": "broken seal"}"#,
        )
        .unwrap();
        assert_eq!(input.movement_type, MovementType::Disposal);
        assert!(input.validate().is_ok());
    }
}
