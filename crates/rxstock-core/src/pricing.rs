//! # Sale Math
//!
//! Prices sale lines from pharmacy products, totals them, computes change,
//! and works out per-barcode quantity deltas when a sale is edited.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PharmacyProduct, SaleItem, SaleLine};

/// A sale line priced server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub pharmacy_product_id: i64,
    pub barcode: String,
    pub name: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub subtotal_cents: i64,
}

/// Header amounts of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub total_cents: i64,
    pub amount_given_cents: Option<i64>,
    pub change_cents: Option<i64>,
}

/// Prices one line at the product's current shelf price.
pub fn price_line(product: &PharmacyProduct, quantity: i64) -> CoreResult<PricedLine> {
    let subtotal = product.price().checked_times(quantity).ok_or_else(|| {
        CoreError::from(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: i64::MAX / product.price_cents.max(1),
        })
    })?;

    Ok(PricedLine {
        pharmacy_product_id: product.id,
        barcode: product.barcode.clone(),
        name: product.name.clone(),
        quantity,
        price_cents: product.price_cents,
        subtotal_cents: subtotal.cents(),
    })
}

/// Totals priced lines and settles tender.
///
/// With no tender given, amount and change stay unset.
pub fn settle(lines: &[PricedLine], amount_given_cents: Option<i64>) -> CoreResult<SaleTotals> {
    let total: Money = lines.iter().map(|l| Money::from_cents(l.subtotal_cents)).sum();

    let change_cents = match amount_given_cents {
        Some(given) => {
            let change = total.change_from(Money::from_cents(given));
            if change.is_negative() {
                return Err(CoreError::InsufficientPayment {
                    total: total.cents(),
                    amount_given: given,
                });
            }
            Some(change.cents())
        }
        None => None,
    };

    Ok(SaleTotals {
        total_cents: total.cents(),
        amount_given_cents,
        change_cents,
    })
}

/// Net quantity change for one barcode between two versions of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDelta {
    pub barcode: String,
    /// Positive: consume more. Negative: give back.
    pub delta: i64,
}

/// Per-barcode `new - old` quantities, zero deltas dropped.
///
/// Barcodes keep the order they first appear in: new lines first, then
/// barcodes that only the old sale had.
pub fn item_deltas(old: &[SaleItem], new: &[SaleLine]) -> Vec<ItemDelta> {
    let mut order: Vec<&str> = Vec::new();
    let mut net: HashMap<&str, i64> = HashMap::new();

    for line in new {
        let entry = net.entry(line.barcode.as_str()).or_insert_with(|| {
            order.push(line.barcode.as_str());
            0
        });
        *entry += line.quantity;
    }
    for item in old {
        let entry = net.entry(item.barcode.as_str()).or_insert_with(|| {
            order.push(item.barcode.as_str());
            0
        });
        *entry -= item.quantity;
    }

    order
        .into_iter()
        .filter_map(|barcode| {
            let delta = net[barcode];
            (delta != 0).then(|| ItemDelta {
                barcode: barcode.to_string(),
                delta,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: i64, barcode: &str, price_cents: i64) -> PharmacyProduct {
        PharmacyProduct {
            id,
            pharmacy_id: 1,
            global_product_id: id,
            barcode: barcode.to_string(),
            name: format!("Product {}", barcode),
            price_cents,
            quantity: 0,
            expiry_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(barcode: &str, quantity: i64) -> SaleItem {
        SaleItem {
            id: 0,
            sale_id: 1,
            pharmacy_product_id: 1,
            barcode: barcode.to_string(),
            name: String::new(),
            quantity,
            price_cents: 100,
            subtotal_cents: 100 * quantity,
        }
    }

    #[test]
    fn test_price_and_settle() {
        let lines = vec![
            price_line(&product(1, "A", 250), 2).unwrap(),
            price_line(&product(2, "B", 199), 1).unwrap(),
        ];
        assert_eq!(lines[0].subtotal_cents, 500);

        let totals = settle(&lines, Some(1000)).unwrap();
        assert_eq!(totals.total_cents, 699);
        assert_eq!(totals.change_cents, Some(301));

        let untendered = settle(&lines, None).unwrap();
        assert_eq!(untendered.amount_given_cents, None);
        assert_eq!(untendered.change_cents, None);
    }

    #[test]
    fn test_underpayment_rejected() {
        let lines = vec![price_line(&product(1, "A", 250), 2).unwrap()];
        assert!(matches!(
            settle(&lines, Some(499)),
            Err(CoreError::InsufficientPayment { total: 500, amount_given: 499 })
        ));
        assert_eq!(settle(&lines, Some(500)).unwrap().change_cents, Some(0));
    }

    #[test]
    fn test_price_overflow_is_validation_error() {
        let err = price_line(&product(1, "A", i64::MAX), 2).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_item_deltas() {
        let old = vec![item("A", 3), item("B", 2), item("C", 1)];
        let new = vec![
            SaleLine::new("A", 5),
            SaleLine::new("B", 2),
            SaleLine::new("D", 4),
            SaleLine::new("A", 1),
        ];

        assert_eq!(
            item_deltas(&old, &new),
            vec![
                ItemDelta { barcode: "A".to_string(), delta: 3 },
                ItemDelta { barcode: "D".to_string(), delta: 4 },
                ItemDelta { barcode: "C".to_string(), delta: -1 },
            ]
        );
    }
}
