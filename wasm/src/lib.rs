//! WebAssembly module for the Pharmacy Order Management dashboard
//!
//! Provides client-side computation for:
//! - Weighted-average cost previews before a purchase order is approved or rejected
//! - FEFO allocation previews
//! - Order total recalculation while an order is being edited
//! - Batch quantities from a movement ledger
//!
//! Structured values travel as JSON strings; decimals are encoded as strings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[derive(Deserialize)]
struct CostInput {
    position: shared::StockPosition,
    selling_price: Decimal,
    po_price: Decimal,
    po_qty: i32,
}

#[derive(Deserialize)]
struct FefoInput {
    product_id: Uuid,
    batches: Vec<ProductBatch>,
    quantity: i32,
    today: NaiveDate,
}

#[derive(Deserialize)]
struct OrderTotalsInput {
    items: Vec<OrderItem>,
    #[serde(default)]
    charges: OrderCharges,
}

#[derive(Deserialize)]
struct LedgerEntry {
    movement_type: MovementType,
    quantity: i32,
}

fn parse<'a, T: Deserialize<'a>>(json: &'a str, what: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {} JSON: {}", what, e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization failed: {}", e))
}

fn merge_cost(input_json: &str) -> Result<String, String> {
    let input: CostInput = parse(input_json, "cost")?;
    let merged = shared::apply_receipt(
        input.position,
        input.selling_price,
        input.po_price,
        input.po_qty,
    )
    .map_err(|e| e.to_string())?;
    to_json(&merged)
}

fn reverse_cost(input_json: &str) -> Result<String, String> {
    let input: CostInput = parse(input_json, "cost")?;
    let reversed = shared::reverse_receipt(
        input.position,
        input.selling_price,
        input.po_price,
        input.po_qty,
    )
    .map_err(|e| e.to_string())?;
    to_json(&reversed)
}

fn fefo_plan(input_json: &str) -> Result<String, String> {
    let input: FefoInput = parse(input_json, "allocation")?;
    let plan = shared::plan_fefo_allocation(
        input.product_id,
        &input.batches,
        input.quantity,
        input.today,
    )
    .map_err(|e| e.to_string())?;
    to_json(&plan)
}

fn order_totals(input_json: &str) -> Result<String, String> {
    let input: OrderTotalsInput = parse(input_json, "order")?;
    let totals = shared::calculate_order_totals(&input.items, &input.charges)
        .map_err(|e| e.to_string())?;
    to_json(&totals)
}

fn ledger_quantity_of(movements_json: &str) -> Result<i64, String> {
    let entries: Vec<LedgerEntry> = parse(movements_json, "movements")?;
    if let Some(bad) = entries.iter().find(|e| e.quantity <= 0) {
        return Err(format!("Movement quantity must be positive, got {}", bad.quantity));
    }
    Ok(shared::fold_ledger(entries.iter().map(|e| (e.movement_type, e.quantity))).balance)
}

/// Stock position after approving a purchase line:
/// `{ position: { quantity, cost_per_unit }, selling_price, po_price, po_qty }`
#[wasm_bindgen]
pub fn weighted_average_cost(input_json: &str) -> Result<String, JsValue> {
    merge_cost(input_json).map_err(|e| JsValue::from_str(&e))
}

/// Stock position after rejecting an approved purchase line (same input as
/// `weighted_average_cost`)
#[wasm_bindgen]
pub fn reverse_weighted_average_cost(input_json: &str) -> Result<String, JsValue> {
    reverse_cost(input_json).map_err(|e| JsValue::from_str(&e))
}

/// FEFO allocation plan: `{ product_id, batches, quantity, today }`
#[wasm_bindgen]
pub fn plan_fefo(input_json: &str) -> Result<String, JsValue> {
    fefo_plan(input_json).map_err(|e| JsValue::from_str(&e))
}

/// Derived order totals: `{ items, charges }`
#[wasm_bindgen]
pub fn calculate_order_totals(input_json: &str) -> Result<String, JsValue> {
    order_totals(input_json).map_err(|e| JsValue::from_str(&e))
}

/// Batch quantity implied by `[{ movement_type, quantity }]`
#[wasm_bindgen]
pub fn batch_quantity_from_ledger(movements_json: &str) -> Result<f64, JsValue> {
    ledger_quantity_of(movements_json)
        .map(|q| q as f64)
        .map_err(|e| JsValue::from_str(&e))
}

/// Whether a batch number is acceptable
#[wasm_bindgen]
pub fn is_valid_batch_number(batch_number: &str) -> bool {
    validate_batch_number(batch_number).is_ok()
}
