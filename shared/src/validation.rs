//! Validation utilities for batch inventory input

use chrono::NaiveDate;
use rust_decimal::Decimal;

// ============================================================================
// Batch Validations
// ============================================================================

/// Validate batch number format (1-64 chars of letters, digits, `-`, `_`, `/`, `.`)
pub fn validate_batch_number(batch_number: &str) -> Result<(), &'static str> {
    let trimmed = batch_number.trim();
    if trimmed.is_empty() {
        return Err("Batch number cannot be empty");
    }
    if trimmed.len() > 64 {
        return Err("Batch number must be at most 64 characters");
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
    {
        return Err("Batch number may only contain letters, digits, '-', '_', '/' and '.'");
    }
    Ok(())
}

/// Validate that a batch was manufactured before it expires
pub fn validate_batch_dates(
    manufacturing_date: Option<NaiveDate>,
    expiry_date: NaiveDate,
) -> Result<(), &'static str> {
    match manufacturing_date {
        Some(made) if made >= expiry_date => {
            Err("Manufacturing date must be before the expiry date")
        }
        _ => Ok(()),
    }
}

/// Validate that a received batch has not already expired
pub fn validate_not_expired(expiry_date: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if expiry_date <= today {
        return Err("Cannot receive a batch that has already expired");
    }
    Ok(())
}

// ============================================================================
// Quantity and Money Validations
// ============================================================================

/// Validate a movement or allocation quantity
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Largest amount a `NUMERIC(14,4)` money column holds
// 99_999_999_999_999 with scale 4 (`Decimal::new` is not const)
pub const MAX_MONEY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 4);

/// Validate a price or cost value
pub fn validate_money(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    if amount.scale() > 4 {
        return Err("Amount cannot have more than 4 decimal places");
    }
    if amount > MAX_MONEY {
        return Err("Amount cannot exceed 9999999999.9999");
    }
    Ok(())
}

/// Validate a tax rate given in percent
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err("Tax rate must be between 0 and 100 percent");
    }
    if rate.scale() > 4 {
        return Err("Tax rate cannot have more than 4 decimal places");
    }
    Ok(())
}

/// Validate an expiry look-ahead window in days
pub fn validate_expiry_window(days: i64) -> Result<(), &'static str> {
    if !(1..=3650).contains(&days) {
        return Err("Expiry window must be between 1 and 3650 days");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_batch_number() {
        assert!(validate_batch_number("LOT-2025/01.A_3").is_ok());
        assert!(validate_batch_number("   ").is_err());
        assert!(validate_batch_number("bad batch").is_err());
        assert!(validate_batch_number(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_batch_dates() {
        assert!(validate_batch_dates(None, date(2025, 1, 1)).is_ok());
        assert!(validate_batch_dates(Some(date(2024, 1, 1)), date(2025, 1, 1)).is_ok());
        assert!(validate_batch_dates(Some(date(2025, 1, 1)), date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_validate_not_expired() {
        assert!(validate_not_expired(date(2025, 1, 2), date(2025, 1, 1)).is_ok());
        assert!(validate_not_expired(date(2025, 1, 1), date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_validate_money() {
        assert!(validate_money(Decimal::from_str("12.3456").unwrap()).is_ok());
        assert!(validate_money(Decimal::from_str("0.00001").unwrap()).is_err());
        assert!(validate_money(Decimal::from_str("-1").unwrap()).is_err());
        assert!(validate_money(Decimal::from_str("9999999999.9999").unwrap()).is_ok());
        assert!(validate_money(Decimal::from_str("10000000000").unwrap()).is_err());
        assert!(validate_money(Decimal::MAX.trunc()).is_err());
    }

    #[test]
    fn test_max_money_matches_column() {
        assert_eq!(MAX_MONEY, Decimal::from_str("9999999999.9999").unwrap());
    }

    #[test]
    fn test_validate_tax_rate() {
        assert!(validate_tax_rate(Decimal::from_str("8.25").unwrap()).is_ok());
        assert!(validate_tax_rate(Decimal::ONE_HUNDRED).is_ok());
        assert!(validate_tax_rate(Decimal::from_str("100.01").unwrap()).is_err());
        assert!(validate_tax_rate(Decimal::from_str("-0.5").unwrap()).is_err());
    }

    #[test]
    fn test_validate_quantity_and_window() {
        assert!(validate_positive_quantity(1).is_ok());
        assert!(validate_positive_quantity(0).is_err());
        assert!(validate_expiry_window(90).is_ok());
        assert!(validate_expiry_window(0).is_err());
    }
}
