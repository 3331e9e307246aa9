//! Route definitions for the Pharmacy Order Management API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // Batch inventory and ledger
        .nest("/batches", batch_routes())
        // Per-product stock summary
        .route("/products/:product_id/stock", get(handlers::get_product_stock))
        // FEFO allocation
        .nest("/allocations", allocation_routes())
        // Purchase order decisions
        .nest("/purchase-orders", purchase_order_routes())
        // Sales orders
        .nest("/orders", order_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .merge(protected)
}

/// Batch routes (protected)
fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_batches).post(handlers::receive_batch))
        .route("/expiring", get(handlers::list_expiring_batches))
        .route("/expire", post(handlers::expire_batches))
        .route("/:batch_id", get(handlers::get_batch))
        .route("/:batch_id/status", put(handlers::update_batch_status))
        .route(
            "/:batch_id/movements",
            get(handlers::list_movements).post(handlers::record_movement),
        )
        .route("/:batch_id/reconcile", get(handlers::reconcile_batch))
}

/// Allocation routes (protected)
fn allocation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::allocate_stock))
        .route("/preview", post(handlers::preview_allocation))
        .route("/release", post(handlers::release_allocation))
}

/// Purchase order routes (protected)
fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/:po_id", get(handlers::get_purchase_order))
        .route("/:po_id/approve", post(handlers::approve_purchase_order))
        .route("/:po_id/reject", post(handlers::reject_purchase_order))
}

/// Sales order routes (protected)
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/recalculate", post(handlers::recalculate_order))
        .route("/:order_id/allocate", post(handlers::allocate_order))
        .route("/:order_id/release", post(handlers::release_order))
}
