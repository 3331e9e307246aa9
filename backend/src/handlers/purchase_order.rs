//! HTTP handlers for purchase order decisions

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::permissions;
use crate::middleware::CurrentUser;
use crate::models::PurchaseOrder;
use crate::services::purchase_order::PurchaseOrderDecision;
use crate::services::PurchaseOrderService;
use crate::AppState;

/// Get a purchase order
pub async fn get_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(po_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(permissions::ORDERS_READ)?;
    let service = PurchaseOrderService::new(state.db);
    let po = service.get_purchase_order(po_id).await?;
    Ok(Json(po))
}

/// Approve a purchase order
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(po_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderDecision>> {
    current_user.0.require(permissions::PURCHASE_ORDERS_APPROVE)?;
    let service = PurchaseOrderService::new(state.db);
    let decision = service.approve(po_id, current_user.0.user_id).await?;
    Ok(Json(decision))
}

/// Reject a purchase order
pub async fn reject_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(po_id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrderDecision>> {
    current_user.0.require(permissions::PURCHASE_ORDERS_APPROVE)?;
    let service = PurchaseOrderService::new(state.db);
    let decision = service.reject(po_id, current_user.0.user_id).await?;
    Ok(Json(decision))
}
