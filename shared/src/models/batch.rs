//! Product batch (lot) models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{MovementDirection, MovementType};

/// A received batch of a product, tracked until it is sold, disposed or expires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductBatch {
    #[serde(default)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_number: String,
    pub lot_number: Option<String>,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: NaiveDate,
    pub quantity: i32,
    pub cost_per_unit: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub status: BatchStatus,
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Quarantine,
    Recalled,
    Expired,
    Depleted,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 5] = [
        BatchStatus::Active,
        BatchStatus::Quarantine,
        BatchStatus::Recalled,
        BatchStatus::Expired,
        BatchStatus::Depleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Quarantine => "quarantine",
            BatchStatus::Recalled => "recalled",
            BatchStatus::Expired => "expired",
            BatchStatus::Depleted => "depleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BatchStatus::Active),
            "quarantine" => Some(BatchStatus::Quarantine),
            "recalled" => Some(BatchStatus::Recalled),
            "expired" => Some(BatchStatus::Expired),
            "depleted" => Some(BatchStatus::Depleted),
            _ => None,
        }
    }

    /// Recalled and expired batches never return to circulation
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Recalled | BatchStatus::Expired)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when a batch cannot accept a movement or status change
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("movement quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("batch {batch_number} holds {available} units, cannot remove {requested}")]
    InsufficientQuantity {
        batch_number: String,
        available: i32,
        requested: i32,
    },

    #[error("{movement_type} movements are not allowed on a {status} batch")]
    MovementNotAllowed {
        movement_type: MovementType,
        status: BatchStatus,
    },

    #[error("cannot change batch status from {from} to {to}: {reason}")]
    InvalidTransition {
        from: BatchStatus,
        to: BatchStatus,
        reason: &'static str,
    },
}

/// Result of applying one movement to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementEffect {
    pub quantity_after: i32,
    pub status_after: BatchStatus,
}

impl ProductBatch {
    /// A batch is expired on and after its expiry date
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date <= today
    }

    /// Whether FEFO allocation may draw from this batch
    pub fn is_allocatable(&self, today: NaiveDate) -> bool {
        self.status == BatchStatus::Active && !self.is_expired(today) && self.quantity > 0
    }

    /// Days left until expiry (negative once expired)
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    /// Value of the units on hand at the recorded cost, if any
    pub fn stock_value(&self) -> Option<Decimal> {
        self.cost_per_unit.map(|cost| cost * Decimal::from(self.quantity))
    }

    /// Compute quantity and status after a movement without mutating the batch.
    pub fn apply_movement(
        &self,
        movement_type: MovementType,
        quantity: i32,
        today: NaiveDate,
    ) -> Result<MovementEffect, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let allowed = match self.status {
            BatchStatus::Recalled | BatchStatus::Expired => movement_type == MovementType::Disposal,
            BatchStatus::Quarantine => movement_type != MovementType::Sale,
            BatchStatus::Active | BatchStatus::Depleted => true,
        };
        if !allowed {
            return Err(LedgerError::MovementNotAllowed {
                movement_type,
                status: self.status,
            });
        }

        let quantity_after = match movement_type.direction() {
            MovementDirection::In => self.quantity.checked_add(quantity).ok_or(
                LedgerError::InvalidQuantity(quantity),
            )?,
            MovementDirection::Out => {
                if quantity > self.quantity {
                    return Err(LedgerError::InsufficientQuantity {
                        batch_number: self.batch_number.clone(),
                        available: self.quantity,
                        requested: quantity,
                    });
                }
                self.quantity - quantity
            }
        };

        let status_after = match self.status {
            BatchStatus::Active | BatchStatus::Quarantine if quantity_after == 0 => {
                BatchStatus::Depleted
            }
            BatchStatus::Depleted if quantity_after > 0 => {
                if self.is_expired(today) {
                    BatchStatus::Expired
                } else {
                    BatchStatus::Active
                }
            }
            status => status,
        };

        Ok(MovementEffect {
            quantity_after,
            status_after,
        })
    }

    /// Validate a manual status change requested by an operator
    pub fn validate_status_change(&self, target: BatchStatus) -> Result<(), LedgerError> {
        let invalid = |reason| LedgerError::InvalidTransition {
            from: self.status,
            to: target,
            reason,
        };

        if self.status == target {
            return Err(invalid("batch already has this status"));
        }
        if self.status.is_terminal() {
            return Err(invalid("recalled and expired batches cannot change status"));
        }

        match target {
            BatchStatus::Active | BatchStatus::Quarantine if self.quantity == 0 => {
                Err(invalid("batch has no stock"))
            }
            BatchStatus::Active | BatchStatus::Quarantine => Ok(()),
            BatchStatus::Depleted if self.quantity > 0 => Err(invalid("batch still holds stock")),
            BatchStatus::Depleted | BatchStatus::Recalled => Ok(()),
            BatchStatus::Expired => Err(invalid("expiry is applied by the expiry sweep")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(quantity: i32, status: BatchStatus) -> ProductBatch {
        ProductBatch {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_number: "B-001".to_string(),
            lot_number: None,
            manufacturing_date: None,
            expiry_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            quantity,
            cost_per_unit: Some(Decimal::from(5)),
            supplier_id: None,
            status,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_sale_depletes_batch() {
        let effect = batch(10, BatchStatus::Active)
            .apply_movement(MovementType::Sale, 10, today())
            .unwrap();
        assert_eq!(effect.quantity_after, 0);
        assert_eq!(effect.status_after, BatchStatus::Depleted);
    }

    #[test]
    fn test_return_reactivates_depleted_batch() {
        let effect = batch(0, BatchStatus::Depleted)
            .apply_movement(MovementType::Return, 3, today())
            .unwrap();
        assert_eq!(effect.quantity_after, 3);
        assert_eq!(effect.status_after, BatchStatus::Active);
    }

    #[test]
    fn test_return_after_expiry_marks_expired() {
        let late = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let effect = batch(0, BatchStatus::Depleted)
            .apply_movement(MovementType::Return, 3, late)
            .unwrap();
        assert_eq!(effect.status_after, BatchStatus::Expired);
    }

    #[test]
    fn test_outgoing_movement_cannot_exceed_stock() {
        let err = batch(4, BatchStatus::Active)
            .apply_movement(MovementType::Disposal, 5, today())
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientQuantity {
                available: 4,
                requested: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_recalled_batch_only_accepts_disposal() {
        let recalled = batch(8, BatchStatus::Recalled);
        assert!(recalled
            .apply_movement(MovementType::Sale, 1, today())
            .is_err());
        assert!(recalled
            .apply_movement(MovementType::Return, 1, today())
            .is_err());
        let effect = recalled
            .apply_movement(MovementType::Disposal, 8, today())
            .unwrap();
        assert_eq!(effect.quantity_after, 0);
        assert_eq!(effect.status_after, BatchStatus::Recalled);
    }

    #[test]
    fn test_quarantined_batch_cannot_be_sold() {
        let err = batch(8, BatchStatus::Quarantine)
            .apply_movement(MovementType::Sale, 1, today())
            .unwrap_err();
        assert!(matches!(err, LedgerError::MovementNotAllowed { .. }));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let b = batch(8, BatchStatus::Active);
        assert_eq!(
            b.apply_movement(MovementType::Adjustment, 0, today()),
            Err(LedgerError::InvalidQuantity(0))
        );
        assert!(b.apply_movement(MovementType::Receipt, -2, today()).is_err());
    }

    #[test]
    fn test_status_changes() {
        assert!(batch(5, BatchStatus::Active)
            .validate_status_change(BatchStatus::Quarantine)
            .is_ok());
        assert!(batch(5, BatchStatus::Quarantine)
            .validate_status_change(BatchStatus::Active)
            .is_ok());
        assert!(batch(5, BatchStatus::Active)
            .validate_status_change(BatchStatus::Recalled)
            .is_ok());
        assert!(batch(5, BatchStatus::Active)
            .validate_status_change(BatchStatus::Depleted)
            .is_err());
        assert!(batch(0, BatchStatus::Depleted)
            .validate_status_change(BatchStatus::Active)
            .is_err());
        assert!(batch(5, BatchStatus::Recalled)
            .validate_status_change(BatchStatus::Active)
            .is_err());
        assert!(batch(5, BatchStatus::Active)
            .validate_status_change(BatchStatus::Expired)
            .is_err());
        assert!(batch(5, BatchStatus::Active)
            .validate_status_change(BatchStatus::Active)
            .is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let b = batch(5, BatchStatus::Active);
        let expiry = b.expiry_date;
        assert!(b.is_expired(expiry));
        assert!(!b.is_expired(expiry.pred_opt().unwrap()));
        assert!(b.is_allocatable(expiry.pred_opt().unwrap()));
        assert_eq!(b.days_until_expiry(expiry.pred_opt().unwrap()), 1);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in BatchStatus::ALL {
            assert_eq!(BatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::parse("sold"), None);
    }
}
