//! HTTP handlers for batch inventory endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::CurrentUser;
use crate::models::{BatchMovement, ProductBatch, StockSummary};
use crate::services::batch::{
    BatchFilter, ExpiringBatch, ReceiveBatchInput, ReconcileReport, RecordMovementInput,
    UpdateStatusInput,
};
use crate::services::{export, BatchService};
use crate::AppState;

#[derive(Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>, // "json" or "csv"
}

/// Receive a new batch
pub async fn receive_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReceiveBatchInput>,
) -> AppResult<Json<ProductBatch>> {
    current_user.0.require(permissions::BATCHES_WRITE)?;
    let service = BatchService::new(state.db);
    let batch = service.receive_batch(current_user.0.user_id, input).await?;
    Ok(Json(batch))
}

/// List batches, optionally for one product or status
pub async fn list_batches(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<BatchFilter>,
) -> AppResult<Json<Vec<ProductBatch>>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = BatchService::new(state.db);
    let batches = service.list_batches(filter).await?;
    Ok(Json(batches))
}

/// Get a batch by ID
pub async fn get_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<ProductBatch>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = BatchService::new(state.db);
    let batch = service.get_batch(batch_id).await?;
    Ok(Json(batch))
}

/// Active batches expiring within the requested window
pub async fn list_expiring_batches(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiringBatch>>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let days = query
        .days
        .unwrap_or(state.config.inventory.expiring_soon_days);
    let service = BatchService::new(state.db);
    let batches = service.expiring_soon(days).await?;
    Ok(Json(batches))
}

/// Run the expiry sweep
pub async fn expire_batches(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<ProductBatch>>> {
    current_user.0.require(permissions::BATCHES_WRITE)?;
    let service = BatchService::new(state.db);
    let expired = service.expire_batches().await?;
    Ok(Json(expired))
}

/// Change the status of a batch
pub async fn update_batch_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<Json<ProductBatch>> {
    current_user.0.require(permissions::BATCHES_WRITE)?;
    let service = BatchService::new(state.db);
    let batch = service
        .update_status(batch_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(batch))
}

/// Record a manual movement
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<Json<BatchMovement>> {
    current_user.0.require(permissions::BATCHES_WRITE)?;
    let service = BatchService::new(state.db);
    let movement = service
        .record_movement(batch_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(movement))
}

/// List the ledger of a batch as JSON or CSV
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> AppResult<impl IntoResponse> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = BatchService::new(state.db);

    if query.format.as_deref() == Some("csv") {
        let rows = service.export_movements(batch_id).await?;
        let csv = export::to_csv(&rows)?;
        let disposition = format!("attachment; filename=\"batch_{}_movements.csv\"", batch_id);
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            csv,
        )
            .into_response())
    } else {
        let movements = service.list_movements(batch_id).await?;
        Ok(Json(movements).into_response())
    }
}

/// Compare a batch's quantity with its ledger
pub async fn reconcile_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<ReconcileReport>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = BatchService::new(state.db);
    let report = service.reconcile_batch(batch_id).await?;
    Ok(Json(report))
}

/// Batch stock of a product by status
pub async fn get_product_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<StockSummary>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = BatchService::new(state.db);
    let summary = service.product_stock(product_id).await?;
    Ok(Json(summary))
}
