//! FEFO stock allocation against product batches
//!
//! Plans are computed by `shared::allocation` against batches locked with
//! `FOR UPDATE`, then written in the caller's transaction. A shortfall on any
//! product returns before the first write, and dropping the transaction rolls
//! back anything already written for earlier products.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    convert_rows, BatchMovement, BatchRow, MovementType, ProductBatch, BATCH_COLUMNS,
};
use crate::services::batch::{
    apply_batch_movement, lock_allocatable_batches, lock_batches, today, MovementDraft,
};
use shared::types::Reference;
use shared::{plan_fefo_allocation, AllocationPlan};

/// Allocation service for drawing stock first-expired-first-out
#[derive(Clone)]
pub struct AllocationService {
    db: PgPool,
}

/// Input for planning an allocation
#[derive(Debug, Deserialize, Validate)]
pub struct AllocationRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Input for allocating stock to a document
#[derive(Debug, Deserialize, Validate)]
pub struct AllocateInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 50))]
    pub reference_type: String,
    pub reference_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Input for returning the stock allocated to a document
#[derive(Debug, Deserialize, Validate)]
pub struct ReleaseInput {
    #[validate(length(min = 1, max = 50))]
    pub reference_type: String,
    pub reference_id: Uuid,
}

/// Allocation plan together with the movements written for it
#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    pub plan: AllocationPlan,
    pub movements: Vec<BatchMovement>,
}

/// Return movements written by a release
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseResult {
    pub reference_type: String,
    pub reference_id: Uuid,
    pub released_quantity: i64,
    pub movements: Vec<BatchMovement>,
}

/// Net quantity a reference still holds on one batch
#[derive(Debug, FromRow)]
struct OutstandingRow {
    batch_id: Uuid,
    outstanding: i64,
}

impl AllocationService {
    /// Create a new AllocationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Plan an allocation without writing anything
    pub async fn preview(&self, input: AllocationRequest) -> AppResult<AllocationPlan> {
        input.validate()?;

        let today = today();
        let sql = format!(
            r#"
            SELECT {}
            FROM product_batches
            WHERE product_id = $1
              AND status = 'active'
              AND quantity > 0
              AND expiry_date > $2
            "#,
            BATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(input.product_id)
            .bind(today)
            .fetch_all(&self.db)
            .await?;
        let batches: Vec<ProductBatch> = convert_rows(rows)?;

        Ok(plan_fefo_allocation(
            input.product_id,
            &batches,
            input.quantity,
            today,
        )?)
    }

    /// Allocate stock of one product to a document in a single transaction
    pub async fn allocate_fefo(
        &self,
        user_id: Uuid,
        input: AllocateInput,
    ) -> AppResult<AllocationResult> {
        input.validate()?;

        let reference = Reference {
            reference_type: input.reference_type,
            reference_id: input.reference_id,
        };

        let mut tx = self.db.begin().await?;
        let result = allocate_in_tx(
            &mut *tx,
            input.product_id,
            input.quantity,
            &reference,
            input.notes,
            user_id,
        )
        .await?;
        tx.commit().await?;

        Ok(result)
    }

    /// Return everything still allocated to a document
    pub async fn release(&self, user_id: Uuid, input: ReleaseInput) -> AppResult<ReleaseResult> {
        input.validate()?;

        let reference = Reference {
            reference_type: input.reference_type,
            reference_id: input.reference_id,
        };

        let mut tx = self.db.begin().await?;
        let result = release_in_tx(&mut *tx, &reference, user_id).await?;
        tx.commit().await?;

        Ok(result)
    }
}

/// Plan and write one FEFO allocation inside an open transaction
pub(crate) async fn allocate_in_tx(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
    reference: &Reference,
    notes: Option<String>,
    user_id: Uuid,
) -> AppResult<AllocationResult> {
    let today = today();
    let batches = lock_allocatable_batches(conn, product_id, today).await?;

    let plan = match plan_fefo_allocation(product_id, &batches, quantity, today) {
        Ok(plan) => plan,
        Err(err) => {
            tracing::warn!(
                product_id = %product_id,
                requested = quantity,
                reference_type = %reference.reference_type,
                reference_id = %reference.reference_id,
                "Allocation refused: {}",
                err
            );
            return Err(err.into());
        }
    };

    let mut movements = Vec::with_capacity(plan.lines.len());
    for line in &plan.lines {
        let batch = batches
            .iter()
            .find(|b| b.id == line.batch_id)
            .ok_or_else(|| AppError::Internal("Planned batch is not locked".to_string()))?;
        let draft = MovementDraft {
            movement_type: MovementType::Sale,
            quantity: line.quantity,
            reference: Some(reference.clone()),
            notes: notes.clone(),
            created_by: Some(user_id),
        };
        let (_, movement) = apply_batch_movement(conn, batch, &draft, today).await?;
        movements.push(movement);
    }

    tracing::info!(
        product_id = %product_id,
        quantity = quantity,
        batches = plan.lines.len(),
        reference_type = %reference.reference_type,
        reference_id = %reference.reference_id,
        "Stock allocated"
    );

    Ok(AllocationResult { plan, movements })
}

/// Units a reference still holds per batch: its sales minus its returns
pub(crate) async fn outstanding_by_batch(
    conn: &mut PgConnection,
    reference: &Reference,
) -> AppResult<BTreeMap<Uuid, i64>> {
    let rows = sqlx::query_as::<_, OutstandingRow>(
        r#"
        SELECT batch_id,
               COALESCE(SUM(CASE WHEN movement_type = 'sale' THEN quantity
                                 WHEN movement_type = 'return' THEN -quantity
                                 ELSE 0 END), 0)::BIGINT AS outstanding
        FROM batch_movements
        WHERE reference_type = $1 AND reference_id = $2
        GROUP BY batch_id
        "#,
    )
    .bind(&reference.reference_type)
    .bind(reference.reference_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|row| row.outstanding > 0)
        .map(|row| (row.batch_id, row.outstanding))
        .collect())
}

/// Write return movements for everything a reference still holds
pub(crate) async fn release_in_tx(
    conn: &mut PgConnection,
    reference: &Reference,
    user_id: Uuid,
) -> AppResult<ReleaseResult> {
    let outstanding = outstanding_by_batch(conn, reference).await?;
    if outstanding.is_empty() {
        return Err(AppError::Conflict(format!(
            "No allocated stock to release for {} {}",
            reference.reference_type, reference.reference_id
        )));
    }

    let batch_ids: Vec<Uuid> = outstanding.keys().copied().collect();
    let batches = lock_batches(conn, &batch_ids).await?;
    let today = today();

    let mut movements = Vec::with_capacity(batches.len());
    let mut released_quantity = 0i64;
    for batch in &batches {
        let Some(&quantity) = outstanding.get(&batch.id) else {
            continue;
        };
        let quantity = i32::try_from(quantity)
            .map_err(|_| AppError::Internal("Outstanding quantity out of range".to_string()))?;
        let draft = MovementDraft {
            movement_type: MovementType::Return,
            quantity,
            reference: Some(reference.clone()),
            notes: Some("Allocation released".to_string()),
            created_by: Some(user_id),
        };
        let (_, movement) = apply_batch_movement(conn, batch, &draft, today).await?;
        released_quantity += i64::from(quantity);
        movements.push(movement);
    }

    tracing::info!(
        reference_type = %reference.reference_type,
        reference_id = %reference.reference_id,
        released_quantity = released_quantity,
        "Allocation released"
    );

    Ok(ReleaseResult {
        reference_type: reference.reference_type.clone(),
        reference_id: reference.reference_id,
        released_quantity,
        movements,
    })
}
