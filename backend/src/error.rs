//! Error handling for the Pharmacy Order Management server
//!
//! Every error becomes a JSON body `{ "error": { "code", "message", "field" } }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use shared::{
    AllocationError, CostingError, LedgerError, OrderTotalsError, PurchaseOrderError,
};

/// Postgres SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Permission denied: requires {0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Option<Uuid>,
        requested: i64,
        available: i64,
    },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field validation failure
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// A unique-constraint violation becomes `Conflict`; other database errors pass through
    pub fn conflict_on_duplicate(err: sqlx::Error, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::Conflict(message.into())
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorDetail::new("UNAUTHORIZED", msg.clone()))
            }
            AppError::Forbidden(permission) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "FORBIDDEN",
                    format!("Permission denied: requires {}", permission),
                ),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorDetail::new("CONFLICT", msg.clone()))
            }
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::InsufficientStock { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INSUFFICIENT_STOCK", self.to_string()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request refused: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidQuantity(_) => AppError::validation("quantity", err.to_string()),
            AllocationError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::InsufficientStock {
                product_id: Some(product_id),
                requested,
                available,
            },
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidQuantity(_) => AppError::validation("quantity", err.to_string()),
            LedgerError::InsufficientQuantity {
                available,
                requested,
                ..
            } => AppError::InsufficientStock {
                product_id: None,
                requested: i64::from(requested),
                available: i64::from(available),
            },
            LedgerError::MovementNotAllowed { .. } | LedgerError::InvalidTransition { .. } => {
                AppError::InvalidStateTransition(err.to_string())
            }
        }
    }
}

impl From<CostingError> for AppError {
    fn from(err: CostingError) -> Self {
        match err {
            CostingError::InsufficientStock { on_hand, requested } => AppError::InsufficientStock {
                product_id: None,
                requested: i64::from(requested),
                available: i64::from(on_hand),
            },
            CostingError::NegativeCostBasis(_) | CostingError::NegativeStock(_) => {
                AppError::Conflict(err.to_string())
            }
            CostingError::InvalidQuantity(_) => AppError::validation("quantity", err.to_string()),
            CostingError::NegativePrice(_) | CostingError::Overflow => {
                AppError::validation("unit_price", err.to_string())
            }
        }
    }
}

impl From<PurchaseOrderError> for AppError {
    fn from(err: PurchaseOrderError) -> Self {
        match err {
            PurchaseOrderError::AlreadyApproved | PurchaseOrderError::AlreadyRejected => {
                AppError::InvalidStateTransition(err.to_string())
            }
            PurchaseOrderError::InconsistentFlags => AppError::Internal(err.to_string()),
            PurchaseOrderError::NoItems => AppError::validation("items", err.to_string()),
        }
    }
}

impl From<OrderTotalsError> for AppError {
    fn from(err: OrderTotalsError) -> Self {
        match err {
            OrderTotalsError::Negative { field } => AppError::validation(field, err.to_string()),
            OrderTotalsError::TaxRateOutOfRange => AppError::validation("tax_rate", err.to_string()),
            OrderTotalsError::Overflow => AppError::validation("items", err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::NotFound("Batch".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::validation("quantity", "bad"), StatusCode::BAD_REQUEST),
            (
                AppError::InsufficientStock {
                    product_id: None,
                    requested: 5,
                    available: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_allocation_shortfall_maps_to_insufficient_stock() {
        let product_id = Uuid::new_v4();
        let err: AppError = AllocationError::InsufficientStock {
            product_id,
            requested: 15,
            available: 9,
        }
        .into();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                product_id: Some(id),
                requested: 15,
                available: 9
            } if id == product_id
        ));
    }

    #[derive(Debug)]
    struct PgError(&'static str);

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "pg error {}", self.0)
        }
    }

    impl std::error::Error for PgError {}

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn test_duplicate_insert_is_conflict() {
        let dup = sqlx::Error::Database(Box::new(PgError("23505")));
        let err = AppError::conflict_on_duplicate(dup, "Batch B1 already exists");
        assert!(matches!(&err, AppError::Conflict(msg) if msg == "Batch B1 already exists"));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let fk = sqlx::Error::Database(Box::new(PgError("23503")));
        assert!(matches!(
            AppError::conflict_on_duplicate(fk, "x"),
            AppError::DatabaseError(_)
        ));
        assert!(matches!(
            AppError::conflict_on_duplicate(sqlx::Error::RowNotFound, "x"),
            AppError::DatabaseError(_)
        ));
    }

    #[test]
    fn test_overflow_is_validation_error() {
        let err: AppError = OrderTotalsError::Overflow.into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        let err: AppError = CostingError::Overflow.into();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_repeated_po_decision_is_state_error() {
        let err: AppError = PurchaseOrderError::AlreadyApproved.into();
        match err {
            AppError::InvalidStateTransition(msg) => {
                assert_eq!(msg, "Purchase order has already been approved")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
