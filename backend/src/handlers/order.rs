//! HTTP handlers for sales order endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::CurrentUser;
use crate::models::Order;
use crate::services::allocation::ReleaseResult;
use crate::services::order::{OrderAllocation, RecalculateInput};
use crate::services::OrderService;
use crate::AppState;

/// Get an order
pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    current_user.0.require(permissions::ORDERS_READ)?;
    let service = OrderService::new(state.db);
    let order = service.get_order(order_id).await?;
    Ok(Json(order))
}

/// Recompute and store order totals
pub async fn recalculate_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RecalculateInput>,
) -> AppResult<Json<Order>> {
    current_user.0.require(permissions::ORDERS_WRITE)?;
    let service = OrderService::new(state.db);
    let order = service.recalculate(order_id, input).await?;
    Ok(Json(order))
}

/// Allocate stock for every item on an order
pub async fn allocate_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderAllocation>> {
    current_user.0.require(permissions::ORDERS_WRITE)?;
    let service = OrderService::new(state.db);
    let allocation = service
        .allocate_order(order_id, current_user.0.user_id)
        .await?;
    Ok(Json(allocation))
}

/// Return the stock allocated to an order
pub async fn release_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ReleaseResult>> {
    current_user.0.require(permissions::ORDERS_WRITE)?;
    let service = OrderService::new(state.db);
    let result = service
        .release_order(order_id, current_user.0.user_id)
        .await?;
    Ok(Json(result))
}
