//! Weighted-average cost basis for purchase order approval and rejection

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Units on hand and their average unit cost
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockPosition {
    pub quantity: i32,
    /// `None` when no purchase cost has been recorded yet
    pub cost_per_unit: Option<Decimal>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CostingError {
    #[error("purchase quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("unit price cannot be negative, got {0}")]
    NegativePrice(Decimal),

    #[error("stock on hand cannot be negative, got {0}")]
    NegativeStock(i32),

    #[error("cannot remove {requested} units, only {on_hand} on hand")]
    InsufficientStock { on_hand: i32, requested: i32 },

    #[error("reversal would leave a negative unit cost of {0}")]
    NegativeCostBasis(Decimal),

    #[error("stock value exceeds the supported range")]
    Overflow,
}

/// Decimal places a cost basis is kept to, matching the `cost_price` column
pub const COST_SCALE: u32 = 12;

fn round_cost(cost: Decimal) -> Decimal {
    cost.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `cost × qty`, failing instead of panicking on overflow
fn stock_value(cost: Decimal, quantity: i32) -> Result<Decimal, CostingError> {
    cost.checked_mul(Decimal::from(quantity)).ok_or(CostingError::Overflow)
}

/// Unit cost used for existing stock: the recorded basis, else the selling price
pub fn effective_cost(cost_per_unit: Option<Decimal>, selling_price: Decimal) -> Decimal {
    cost_per_unit.unwrap_or(selling_price)
}

fn check_inputs(position: &StockPosition, po_price: Decimal, po_qty: i32) -> Result<(), CostingError> {
    if po_qty <= 0 {
        return Err(CostingError::InvalidQuantity(po_qty));
    }
    if po_price < Decimal::ZERO {
        return Err(CostingError::NegativePrice(po_price));
    }
    if position.quantity < 0 {
        return Err(CostingError::NegativeStock(position.quantity));
    }
    Ok(())
}

/// Merge a received purchase into stock.
///
/// `new_cost = (old_cost × old_qty + po_price × po_qty) / (old_qty + po_qty)`
pub fn apply_receipt(
    position: StockPosition,
    selling_price: Decimal,
    po_price: Decimal,
    po_qty: i32,
) -> Result<StockPosition, CostingError> {
    check_inputs(&position, po_price, po_qty)?;

    let old_cost = effective_cost(position.cost_per_unit, selling_price);
    let new_quantity = position
        .quantity
        .checked_add(po_qty)
        .ok_or(CostingError::Overflow)?;

    let total = stock_value(old_cost, position.quantity)?
        .checked_add(stock_value(po_price, po_qty)?)
        .ok_or(CostingError::Overflow)?;
    let new_cost = round_cost(total / Decimal::from(new_quantity));

    Ok(StockPosition {
        quantity: new_quantity,
        cost_per_unit: Some(new_cost),
    })
}

/// Undo a merge made by [`apply_receipt`].
///
/// `reversed_cost = (old_cost × old_qty − po_price × po_qty) / (old_qty − po_qty)`.
/// Removing every unit clears the cost basis.
///
/// A stored basis is off by at most half a unit in its last kept decimal, and
/// the division scales that by `old_qty / remaining`. Results within that bound
/// of zero are zero; anything further below is refused.
pub fn reverse_receipt(
    position: StockPosition,
    selling_price: Decimal,
    po_price: Decimal,
    po_qty: i32,
) -> Result<StockPosition, CostingError> {
    check_inputs(&position, po_price, po_qty)?;

    let remaining = position.quantity - po_qty;
    if remaining < 0 {
        return Err(CostingError::InsufficientStock {
            on_hand: position.quantity,
            requested: po_qty,
        });
    }
    if remaining == 0 {
        return Ok(StockPosition {
            quantity: 0,
            cost_per_unit: None,
        });
    }

    let old_cost = effective_cost(position.cost_per_unit, selling_price);
    let remaining_value = stock_value(old_cost, position.quantity)?
        .checked_sub(stock_value(po_price, po_qty)?)
        .ok_or(CostingError::Overflow)?;
    let reversed = round_cost(remaining_value / Decimal::from(remaining));

    let tolerance =
        Decimal::new(1, COST_SCALE) * Decimal::from(position.quantity) / Decimal::from(remaining);
    let reversed = if reversed.abs() <= tolerance {
        Decimal::ZERO
    } else {
        reversed
    };
    if reversed < Decimal::ZERO {
        return Err(CostingError::NegativeCostBasis(reversed));
    }

    Ok(StockPosition {
        quantity: remaining,
        cost_per_unit: Some(reversed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_apply_receipt_weighted_average() {
        // 100 units at 20 plus 50 units at 30 -> 150 units at 23.33..
        let position = StockPosition {
            quantity: 100,
            cost_per_unit: Some(dec("20")),
        };
        let merged = apply_receipt(position, dec("45"), dec("30"), 50).unwrap();
        assert_eq!(merged.quantity, 150);
        let cost = merged.cost_per_unit.unwrap();
        assert!(cost > dec("23.33") && cost < dec("23.34"));
    }

    #[test]
    fn test_missing_cost_falls_back_to_selling_price() {
        let position = StockPosition {
            quantity: 10,
            cost_per_unit: None,
        };
        let merged = apply_receipt(position, dec("12"), dec("6"), 10).unwrap();
        assert_eq!(merged.cost_per_unit, Some(dec("9")));

        let reversed = reverse_receipt(position, dec("12"), dec("6"), 5).unwrap();
        // (12 * 10 - 6 * 5) / 5 = 18
        assert_eq!(reversed.cost_per_unit, Some(dec("18")));
    }

    #[test]
    fn test_receipt_into_empty_stock_uses_po_price() {
        let position = StockPosition {
            quantity: 0,
            cost_per_unit: None,
        };
        let merged = apply_receipt(position, dec("99"), dec("7.5"), 4).unwrap();
        assert_eq!(merged.quantity, 4);
        assert_eq!(merged.cost_per_unit, Some(dec("7.5")));
    }

    #[test]
    fn test_approve_then_reject_restores_position() {
        let original = StockPosition {
            quantity: 37,
            cost_per_unit: Some(dec("4.10")),
        };
        let merged = apply_receipt(original, dec("9"), dec("3.70"), 13).unwrap();
        let restored = reverse_receipt(merged, dec("9"), dec("3.70"), 13).unwrap();
        assert_eq!(restored.quantity, 37);
        let diff = (restored.cost_per_unit.unwrap() - dec("4.10")).abs();
        assert!(diff < dec("0.000001"));
    }

    #[test]
    fn test_reverse_everything_clears_cost() {
        let position = StockPosition {
            quantity: 10,
            cost_per_unit: Some(dec("5")),
        };
        let reversed = reverse_receipt(position, dec("8"), dec("5"), 10).unwrap();
        assert_eq!(reversed.quantity, 0);
        assert_eq!(reversed.cost_per_unit, None);
    }

    #[test]
    fn test_reverse_more_than_on_hand() {
        let position = StockPosition {
            quantity: 3,
            cost_per_unit: Some(dec("5")),
        };
        assert_eq!(
            reverse_receipt(position, dec("8"), dec("5"), 10),
            Err(CostingError::InsufficientStock {
                on_hand: 3,
                requested: 10
            })
        );
    }

    #[test]
    fn test_reverse_rejects_negative_basis() {
        let position = StockPosition {
            quantity: 10,
            cost_per_unit: Some(dec("1")),
        };
        assert!(matches!(
            reverse_receipt(position, dec("8"), dec("50"), 5),
            Err(CostingError::NegativeCostBasis(_))
        ));
    }

    #[test]
    fn test_invalid_inputs() {
        let position = StockPosition {
            quantity: 10,
            cost_per_unit: Some(dec("1")),
        };
        assert_eq!(
            apply_receipt(position, dec("8"), dec("5"), 0),
            Err(CostingError::InvalidQuantity(0))
        );
        assert_eq!(
            apply_receipt(position, dec("8"), dec("-5"), 1),
            Err(CostingError::NegativePrice(dec("-5")))
        );
        let negative = StockPosition {
            quantity: -1,
            cost_per_unit: None,
        };
        assert_eq!(
            apply_receipt(negative, dec("8"), dec("5"), 1),
            Err(CostingError::NegativeStock(-1))
        );
    }

    #[test]
    fn test_zero_cost_basis_survives_approve_then_reject() {
        // 1 unit at cost 0, then 12 units at 0.01
        let original = StockPosition {
            quantity: 1,
            cost_per_unit: Some(Decimal::ZERO),
        };
        let merged = apply_receipt(original, dec("4"), dec("0.01"), 12).unwrap();
        let restored = reverse_receipt(merged, dec("4"), dec("0.01"), 12).unwrap();
        assert_eq!(restored.quantity, 1);
        assert_eq!(restored.cost_per_unit, Some(Decimal::ZERO));
    }

    #[test]
    fn test_zero_selling_price_fallback_reverses() {
        let original = StockPosition {
            quantity: 7,
            cost_per_unit: None,
        };
        let merged = apply_receipt(original, Decimal::ZERO, dec("7.77"), 3).unwrap();
        let restored = reverse_receipt(merged, Decimal::ZERO, dec("7.77"), 3).unwrap();
        assert_eq!(restored.quantity, 7);
        assert_eq!(restored.cost_per_unit, Some(Decimal::ZERO));
    }

    #[test]
    fn test_costs_kept_to_cost_scale() {
        let position = StockPosition {
            quantity: 1,
            cost_per_unit: Some(dec("1")),
        };
        let merged = apply_receipt(position, dec("1"), dec("2"), 2).unwrap();
        // 5 / 3
        assert_eq!(merged.cost_per_unit, Some(dec("1.666666666667")));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let position = StockPosition {
            quantity: 10,
            cost_per_unit: Some(Decimal::MAX),
        };
        assert_eq!(
            apply_receipt(position, dec("1"), dec("1"), 1),
            Err(CostingError::Overflow)
        );
        assert_eq!(
            reverse_receipt(position, dec("1"), Decimal::MAX, 5),
            Err(CostingError::Overflow)
        );
    }
}
