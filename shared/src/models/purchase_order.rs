//! Purchase order models and approval state

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An inbound purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Option<Uuid>,
    pub po_approved: bool,
    pub po_rejected: bool,
    pub items: Vec<PurchaseOrderItem>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A purchased quantity of one product size
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Approval state derived from the two stored flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    Pending,
    Approved,
    Rejected,
}

/// Operator decision on a purchase order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoDecision {
    Approve,
    Reject,
}

/// Stock effect of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoStockEffect {
    /// Merge the PO quantities and prices into stock
    Merge,
    /// Undo a previous merge
    Reverse,
    /// Only the flags change
    None,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PurchaseOrderError {
    #[error("Purchase order has already been approved")]
    AlreadyApproved,

    #[error("Purchase order has already been rejected")]
    AlreadyRejected,

    #[error("Purchase order is marked both approved and rejected")]
    InconsistentFlags,

    #[error("Purchase order has no items")]
    NoItems,
}

impl PoStatus {
    pub fn from_flags(po_approved: bool, po_rejected: bool) -> Result<Self, PurchaseOrderError> {
        match (po_approved, po_rejected) {
            (false, false) => Ok(PoStatus::Pending),
            (true, false) => Ok(PoStatus::Approved),
            (false, true) => Ok(PoStatus::Rejected),
            (true, true) => Err(PurchaseOrderError::InconsistentFlags),
        }
    }

    /// Flags to store for this status, as `(po_approved, po_rejected)`
    pub fn flags(&self) -> (bool, bool) {
        match self {
            PoStatus::Pending => (false, false),
            PoStatus::Approved => (true, false),
            PoStatus::Rejected => (false, true),
        }
    }

    /// Check a decision against the current state and return the next state with its stock effect
    pub fn decide(&self, decision: PoDecision) -> Result<(PoStatus, PoStockEffect), PurchaseOrderError> {
        match (self, decision) {
            (PoStatus::Pending, PoDecision::Approve) => Ok((PoStatus::Approved, PoStockEffect::Merge)),
            (PoStatus::Pending, PoDecision::Reject) => Ok((PoStatus::Rejected, PoStockEffect::None)),
            (PoStatus::Approved, PoDecision::Reject) => {
                Ok((PoStatus::Rejected, PoStockEffect::Reverse))
            }
            (PoStatus::Approved, PoDecision::Approve) => Err(PurchaseOrderError::AlreadyApproved),
            (PoStatus::Rejected, _) => Err(PurchaseOrderError::AlreadyRejected),
        }
    }
}

impl PurchaseOrder {
    pub fn status(&self) -> Result<PoStatus, PurchaseOrderError> {
        PoStatus::from_flags(self.po_approved, self.po_rejected)
    }

    pub fn total_cost(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisions_from_pending() {
        assert_eq!(
            PoStatus::Pending.decide(PoDecision::Approve),
            Ok((PoStatus::Approved, PoStockEffect::Merge))
        );
        assert_eq!(
            PoStatus::Pending.decide(PoDecision::Reject),
            Ok((PoStatus::Rejected, PoStockEffect::None))
        );
    }

    #[test]
    fn test_reject_after_approve_reverses() {
        assert_eq!(
            PoStatus::Approved.decide(PoDecision::Reject),
            Ok((PoStatus::Rejected, PoStockEffect::Reverse))
        );
    }

    #[test]
    fn test_repeated_decisions_refused() {
        assert_eq!(
            PoStatus::Approved.decide(PoDecision::Approve),
            Err(PurchaseOrderError::AlreadyApproved)
        );
        assert_eq!(
            PoStatus::Rejected.decide(PoDecision::Reject),
            Err(PurchaseOrderError::AlreadyRejected)
        );
        assert_eq!(
            PoStatus::Rejected.decide(PoDecision::Approve),
            Err(PurchaseOrderError::AlreadyRejected)
        );
    }

    #[test]
    fn test_flags() {
        assert_eq!(PoStatus::from_flags(true, true), Err(PurchaseOrderError::InconsistentFlags));
        for status in [PoStatus::Pending, PoStatus::Approved, PoStatus::Rejected] {
            let (approved, rejected) = status.flags();
            assert_eq!(PoStatus::from_flags(approved, rejected), Ok(status));
        }
    }
}
