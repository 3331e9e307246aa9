//! Order totals tests
//!
//! Tests for derived order fields including:
//! - Subtotal, tax, shipping and discount arithmetic
//! - Discount capping and non-negative balance
//! - Per-product quantities used for allocation

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    calculate_order_totals, required_quantities, OrderCharges, OrderItem, OrderItemSize,
    OrderTotalsError,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn item(product_id: Uuid, sizes: &[(i32, Decimal)]) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4(),
        product_id,
        sizes: sizes
            .iter()
            .map(|(quantity, price)| OrderItemSize {
                size_id: Uuid::new_v4(),
                quantity: *quantity,
                price: *price,
            })
            .collect(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Two items, tax 8.25%, shipping 5, discount 10, paid 20
    #[test]
    fn test_full_calculation() {
        let items = vec![
            item(Uuid::new_v4(), &[(2, dec("12.50")), (1, dec("30.00"))]),
            item(Uuid::new_v4(), &[(3, dec("4.99"))]),
        ];
        let charges = OrderCharges {
            tax_rate: dec("8.25"),
            shipping_cost: dec("5"),
            discount_amount: dec("10"),
            paid_amount: dec("20"),
        };

        let totals = calculate_order_totals(&items, &charges).unwrap();
        // 25.00 + 30.00 + 14.97
        assert_eq!(totals.subtotal, dec("69.97"));
        // 69.97 * 0.0825 = 5.772525 -> 5.77
        assert_eq!(totals.tax_amount, dec("5.77"));
        assert_eq!(totals.total_amount, dec("70.74"));
        assert_eq!(totals.balance_due, dec("50.74"));
    }

    /// Tax midpoints round away from zero
    #[test]
    fn test_tax_midpoint_rounding() {
        let items = vec![item(Uuid::new_v4(), &[(1, dec("0.50"))])];
        let charges = OrderCharges {
            tax_rate: dec("5"),
            ..Default::default()
        };
        // 0.50 * 5% = 0.025 -> 0.03
        let totals = calculate_order_totals(&items, &charges).unwrap();
        assert_eq!(totals.tax_amount, dec("0.03"));
    }

    /// Discounts larger than the subtotal are capped, overpayment owes nothing
    #[test]
    fn test_discount_cap_and_overpayment() {
        let items = vec![item(Uuid::new_v4(), &[(1, dec("10"))])];
        let charges = OrderCharges {
            tax_rate: Decimal::ZERO,
            shipping_cost: dec("3"),
            discount_amount: dec("50"),
            paid_amount: dec("100"),
        };
        let totals = calculate_order_totals(&items, &charges).unwrap();
        assert_eq!(totals.discount_amount, dec("10"));
        assert_eq!(totals.total_amount, dec("3"));
        assert_eq!(totals.balance_due, Decimal::ZERO);
    }

    /// Negative charges and out-of-range tax rates are refused
    #[test]
    fn test_invalid_charges() {
        let items = vec![item(Uuid::new_v4(), &[(1, dec("10"))])];
        let negative = OrderCharges {
            shipping_cost: dec("-1"),
            ..Default::default()
        };
        assert_eq!(
            calculate_order_totals(&items, &negative),
            Err(OrderTotalsError::Negative {
                field: "shipping_cost"
            })
        );

        let tax = OrderCharges {
            tax_rate: dec("101"),
            ..Default::default()
        };
        assert_eq!(
            calculate_order_totals(&items, &tax),
            Err(OrderTotalsError::TaxRateOutOfRange)
        );
    }

    /// Amounts past the decimal range are an error, not a panic
    #[test]
    fn test_overflowing_amounts_refused() {
        let items = vec![item(Uuid::new_v4(), &[(1, dec("10"))])];
        let shipping = OrderCharges {
            shipping_cost: Decimal::MAX,
            ..Default::default()
        };
        assert_eq!(
            calculate_order_totals(&items, &shipping),
            Err(OrderTotalsError::Overflow)
        );

        let pricey = vec![item(Uuid::new_v4(), &[(2, Decimal::MAX)])];
        assert_eq!(
            calculate_order_totals(&pricey, &OrderCharges::default()),
            Err(OrderTotalsError::Overflow)
        );

        let taxed = vec![item(Uuid::new_v4(), &[(1, Decimal::MAX)])];
        let charges = OrderCharges {
            tax_rate: dec("50"),
            ..Default::default()
        };
        assert_eq!(
            calculate_order_totals(&taxed, &charges),
            Err(OrderTotalsError::Overflow)
        );
    }

    /// Quantities are summed per product across items and sizes
    #[test]
    fn test_required_quantities() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = vec![
            item(a, &[(2, dec("1")), (3, dec("1"))]),
            item(b, &[(0, dec("1"))]),
            item(a, &[(1, dec("1"))]),
        ];
        let required = required_quantities(&items);
        assert_eq!(required.get(&a), Some(&6));
        // Products with nothing ordered are left out
        assert_eq!(required.get(&b), None);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for generating money amounts 0.00 to 500.00
    fn money_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=50000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// Strategy for generating tax rates 0.00% to 25.00%
    fn tax_rate_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=2500i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn items_strategy() -> impl Strategy<Value = Vec<OrderItem>> {
        prop::collection::vec(
            prop::collection::vec((0i32..=20, money_strategy()), 1..4),
            0..5,
        )
        .prop_map(|items| {
            items
                .iter()
                .map(|sizes| item(Uuid::new_v4(), sizes))
                .collect()
        })
    }

    fn charges_strategy() -> impl Strategy<Value = OrderCharges> {
        (
            tax_rate_strategy(),
            money_strategy(),
            money_strategy(),
            money_strategy(),
        )
            .prop_map(|(tax_rate, shipping_cost, discount_amount, paid_amount)| OrderCharges {
                tax_rate,
                shipping_cost,
                discount_amount,
                paid_amount,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// total = subtotal + tax + shipping - discount, with the discount capped
        #[test]
        fn prop_total_composition(items in items_strategy(), charges in charges_strategy()) {
            let totals = calculate_order_totals(&items, &charges).unwrap();

            prop_assert!(totals.discount_amount <= totals.subtotal);
            prop_assert!(totals.discount_amount <= charges.discount_amount);
            prop_assert_eq!(
                totals.total_amount,
                totals.subtotal + totals.tax_amount + totals.shipping_cost - totals.discount_amount
            );
            prop_assert!(totals.total_amount >= Decimal::ZERO);
        }

        /// The balance is what remains unpaid, never negative
        #[test]
        fn prop_balance_due(items in items_strategy(), charges in charges_strategy()) {
            let totals = calculate_order_totals(&items, &charges).unwrap();

            prop_assert!(totals.balance_due >= Decimal::ZERO);
            prop_assert!(totals.balance_due <= totals.total_amount);
            if charges.paid_amount <= totals.total_amount {
                prop_assert_eq!(totals.balance_due, totals.total_amount - charges.paid_amount);
            }
        }

        /// Tax is kept to cents and within half a cent of the exact value
        #[test]
        fn prop_tax_rounded_to_cents(items in items_strategy(), charges in charges_strategy()) {
            let totals = calculate_order_totals(&items, &charges).unwrap();
            let exact = totals.subtotal * charges.tax_rate / Decimal::ONE_HUNDRED;

            prop_assert!(totals.tax_amount.scale() <= 2);
            prop_assert!((totals.tax_amount - exact).abs() <= dec("0.005"));
        }
    }
}
