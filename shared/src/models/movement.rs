//! Batch movement ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable ledger entry against a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchMovement {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; the sign comes from the movement type
    pub quantity: i32,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Kinds of batch movements
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Receipt,
    Sale,
    Adjustment,
    Transfer,
    Disposal,
    Return,
}

/// Whether a movement adds to or removes from a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::Receipt,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Disposal,
        MovementType::Return,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Disposal => "disposal",
            MovementType::Return => "return",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementType::Receipt),
            "sale" => Some(MovementType::Sale),
            "adjustment" => Some(MovementType::Adjustment),
            "transfer" => Some(MovementType::Transfer),
            "disposal" => Some(MovementType::Disposal),
            "return" => Some(MovementType::Return),
            _ => None,
        }
    }

    pub fn direction(&self) -> MovementDirection {
        match self {
            MovementType::Receipt | MovementType::Return => MovementDirection::In,
            MovementType::Sale
            | MovementType::Adjustment
            | MovementType::Transfer
            | MovementType::Disposal => MovementDirection::Out,
        }
    }

    /// Quantity with the sign this movement applies to the batch
    pub fn signed(&self, quantity: i32) -> i64 {
        match self.direction() {
            MovementDirection::In => i64::from(quantity),
            MovementDirection::Out => -i64::from(quantity),
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals obtained by folding a batch's ledger
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total_in: i64,
    pub total_out: i64,
    pub balance: i64,
    pub movement_count: usize,
}

/// Fold `(type, quantity)` pairs into a ledger summary
pub fn fold_ledger<I>(entries: I) -> LedgerSummary
where
    I: IntoIterator<Item = (MovementType, i32)>,
{
    entries
        .into_iter()
        .fold(LedgerSummary::default(), |mut acc, (movement_type, quantity)| {
            match movement_type.direction() {
                MovementDirection::In => acc.total_in += i64::from(quantity),
                MovementDirection::Out => acc.total_out += i64::from(quantity),
            }
            acc.balance = acc.total_in - acc.total_out;
            acc.movement_count += 1;
            acc
        })
}

/// Current batch quantity implied by its movements
pub fn ledger_quantity<'a, I>(movements: I) -> i64
where
    I: IntoIterator<Item = &'a BatchMovement>,
{
    fold_ledger(movements.into_iter().map(|m| (m.movement_type, m.quantity))).balance
}

/// Well-known reference types written by the services
pub mod reference {
    pub const ORDER: &str = "order";
    pub const PURCHASE_ORDER: &str = "purchase_order";
    pub const MANUAL: &str = "manual";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction() {
        assert_eq!(MovementType::Receipt.direction(), MovementDirection::In);
        assert_eq!(MovementType::Return.direction(), MovementDirection::In);
        for t in [
            MovementType::Sale,
            MovementType::Adjustment,
            MovementType::Transfer,
            MovementType::Disposal,
        ] {
            assert_eq!(t.direction(), MovementDirection::Out);
        }
    }

    #[test]
    fn test_fold_ledger() {
        let summary = fold_ledger(vec![
            (MovementType::Receipt, 50),
            (MovementType::Sale, 20),
            (MovementType::Return, 5),
            (MovementType::Disposal, 10),
            (MovementType::Adjustment, 3),
        ]);
        assert_eq!(summary.total_in, 55);
        assert_eq!(summary.total_out, 33);
        assert_eq!(summary.balance, 22);
        assert_eq!(summary.movement_count, 5);
    }

    #[test]
    fn test_empty_ledger() {
        assert_eq!(fold_ledger(Vec::new()), LedgerSummary::default());
    }

    #[test]
    fn test_ledger_quantity_from_movements() {
        let batch_id = Uuid::new_v4();
        let movement = |movement_type, quantity| BatchMovement {
            id: Uuid::new_v4(),
            batch_id,
            movement_type,
            quantity,
            reference_id: None,
            reference_type: None,
            notes: None,
            created_by: None,
            created_at: Utc::now(),
        };
        let movements = vec![
            movement(MovementType::Receipt, 10),
            movement(MovementType::Sale, 4),
            movement(MovementType::Transfer, 1),
        ];
        assert_eq!(ledger_quantity(&movements), 5);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn entry_strategy() -> impl Strategy<Value = (MovementType, i32)> {
            (prop::sample::select(MovementType::ALL.to_vec()), 1i32..=1000)
        }

        proptest! {
            /// The balance is the sum of signed quantities, in any order
            #[test]
            fn prop_balance_is_signed_sum(entries in prop::collection::vec(entry_strategy(), 0..50)) {
                let summary = fold_ledger(entries.iter().copied());
                let signed: i64 = entries.iter().map(|(t, q)| t.signed(*q)).sum();
                prop_assert_eq!(summary.balance, signed);
                prop_assert_eq!(summary.movement_count, entries.len());

                let reversed = fold_ledger(entries.iter().rev().copied());
                prop_assert_eq!(reversed, summary);
            }
        }
    }
}
