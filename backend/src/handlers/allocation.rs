//! HTTP handlers for FEFO allocation endpoints

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::CurrentUser;
use crate::services::allocation::{
    AllocateInput, AllocationRequest, AllocationResult, ReleaseInput, ReleaseResult,
};
use crate::services::AllocationService;
use crate::AppState;
use shared::AllocationPlan;

/// Plan an allocation without writing it
pub async fn preview_allocation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AllocationRequest>,
) -> AppResult<Json<AllocationPlan>> {
    current_user.0.require(permissions::BATCHES_READ)?;
    let service = AllocationService::new(state.db);
    let plan = service.preview(input).await?;
    Ok(Json(plan))
}

/// Allocate stock to a document
pub async fn allocate_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AllocateInput>,
) -> AppResult<Json<AllocationResult>> {
    current_user.0.require(permissions::ALLOCATIONS_WRITE)?;
    let service = AllocationService::new(state.db);
    let result = service.allocate_fefo(current_user.0.user_id, input).await?;
    Ok(Json(result))
}

/// Return the stock allocated to a document
pub async fn release_allocation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ReleaseInput>,
) -> AppResult<Json<ReleaseResult>> {
    current_user.0.require(permissions::ALLOCATIONS_WRITE)?;
    let service = AllocationService::new(state.db);
    let result = service.release(current_user.0.user_id, input).await?;
    Ok(Json(result))
}
