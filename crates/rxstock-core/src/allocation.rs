//! # FEFO Allocation
//!
//! Plans which batches a sale consumes, and derives the product snapshot.
//!
//! ## First Expired, First Out
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Batches of PARA-500 on 2026-03-10                                      │
//! │                                                                         │
//! │   id  expiry       status   qty   saleable?                            │
//! │   ──  ──────────   ──────   ───   ─────────                            │
//! │    4  2026-03-01   active    6    no (past expiry)                     │
//! │    7  2026-04-30   active    3    yes  ── 1st                          │
//! │    2  2026-06-30   active    5    yes  ── 2nd                          │
//! │    9  2026-06-30   active    8    yes  ── 3rd (same expiry, higher id) │
//! │    5  (none)       active   10    yes  ── last                         │
//! │    8  2026-05-15   void      0    no                                   │
//! │                                                                         │
//! │  consume 6  →  [batch 7 × 3, batch 2 × 3]                              │
//! │  snapshot   →  quantity 26, next expiry 2026-04-30                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning is all-or-nothing: if saleable stock cannot cover the request,
//! nothing is allocated.

use chrono::NaiveDate;
use std::cmp::Ordering;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Allocation, ProductBatch, StockSnapshot};

/// FEFO order: batches with an expiry first, earliest expiry first, then by id.
pub fn fefo_order(a: &ProductBatch, b: &ProductBatch) -> Ordering {
    let key = |batch: &ProductBatch| (batch.expiry_date.is_none(), batch.expiry_date, batch.id);
    key(a).cmp(&key(b))
}

/// Total units that can be sold today.
pub fn saleable_total(batches: &[ProductBatch], today: NaiveDate) -> i64 {
    batches
        .iter()
        .filter(|b| b.is_saleable(today))
        .map(|b| b.quantity)
        .sum()
}

/// Plans a FEFO consumption of `requested` units.
///
/// ## Returns
/// * `Ok(allocations)` - in consumption order, summing to `requested`
/// * `Err(InsufficientStock)` - saleable batches hold less than `requested`
///
/// ## Example
/// ```rust
/// use rxstock_core::allocation::plan_consumption;
///
/// let allocations = plan_consumption(&[], 0, chrono::NaiveDate::MIN, "X");
/// assert!(allocations.is_err());
/// ```
pub fn plan_consumption(
    batches: &[ProductBatch],
    requested: i64,
    today: NaiveDate,
    barcode: &str,
) -> CoreResult<Vec<Allocation>> {
    if requested <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let available = saleable_total(batches, today);
    if available < requested {
        return Err(CoreError::InsufficientStock {
            barcode: barcode.to_string(),
            available,
            requested,
        });
    }

    let mut saleable: Vec<&ProductBatch> = batches.iter().filter(|b| b.is_saleable(today)).collect();
    saleable.sort_by(|a, b| fefo_order(a, b));

    let mut remaining = requested;
    let mut allocations = Vec::new();
    for batch in saleable {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity);
        allocations.push(Allocation {
            batch_id: batch.id,
            qty: take,
        });
        remaining -= take;
    }

    Ok(allocations)
}

/// Derives the product snapshot from its batches.
///
/// Quantity is the sum over saleable batches; next expiry is the earliest
/// non-null expiry among them.
pub fn snapshot_of(batches: &[ProductBatch], today: NaiveDate) -> StockSnapshot {
    let saleable = batches.iter().filter(|b| b.is_saleable(today));

    let mut snapshot = StockSnapshot::empty();
    for batch in saleable {
        snapshot.quantity += batch.quantity;
        snapshot.next_expiry = match (snapshot.next_expiry, batch.expiry_date) {
            (Some(current), Some(candidate)) => Some(current.min(candidate)),
            (None, candidate) => candidate,
            (current, None) => current,
        };
    }
    snapshot
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchStatus;
    use chrono::Utc;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn batch(id: i64, expiry: Option<&str>, status: BatchStatus, quantity: i64) -> ProductBatch {
        ProductBatch {
            id,
            pharmacy_id: 1,
            pharmacy_product_id: 1,
            quantity,
            expiry_date: expiry.map(date),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn shelf() -> Vec<ProductBatch> {
        vec![
            batch(4, Some("2026-03-01"), BatchStatus::Active, 6),
            batch(7, Some("2026-04-30"), BatchStatus::Active, 3),
            batch(2, Some("2026-06-30"), BatchStatus::Active, 5),
            batch(9, Some("2026-06-30"), BatchStatus::Active, 8),
            batch(5, None, BatchStatus::Active, 10),
            batch(8, Some("2026-05-15"), BatchStatus::Void, 0),
        ]
    }

    #[test]
    fn test_plan_follows_fefo() {
        let plan = plan_consumption(&shelf(), 6, date("2026-03-10"), "PARA").unwrap();
        assert_eq!(
            plan,
            vec![
                Allocation { batch_id: 7, qty: 3 },
                Allocation { batch_id: 2, qty: 3 },
            ]
        );
    }

    #[test]
    fn test_equal_expiry_breaks_ties_by_id() {
        let plan = plan_consumption(&shelf(), 10, date("2026-03-10"), "PARA").unwrap();
        assert_eq!(
            plan,
            vec![
                Allocation { batch_id: 7, qty: 3 },
                Allocation { batch_id: 2, qty: 5 },
                Allocation { batch_id: 9, qty: 2 },
            ]
        );
    }

    #[test]
    fn test_undated_batches_go_last() {
        let plan = plan_consumption(&shelf(), 26, date("2026-03-10"), "PARA").unwrap();
        assert_eq!(plan.last(), Some(&Allocation { batch_id: 5, qty: 10 }));
        assert_eq!(plan.iter().map(|a| a.qty).sum::<i64>(), 26);
    }

    #[test]
    fn test_insufficient_ignores_expired_stock() {
        let err = plan_consumption(&shelf(), 27, date("2026-03-10"), "PARA").unwrap_err();
        match err {
            CoreError::InsufficientStock {
                barcode,
                available,
                requested,
            } => {
                assert_eq!(barcode, "PARA");
                assert_eq!(available, 26);
                assert_eq!(requested, 27);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_batch_expiring_today_is_consumed() {
        let batches = vec![batch(1, Some("2026-03-10"), BatchStatus::Active, 2)];
        let plan = plan_consumption(&batches, 2, date("2026-03-10"), "X").unwrap();
        assert_eq!(plan, vec![Allocation { batch_id: 1, qty: 2 }]);
        assert!(plan_consumption(&batches, 1, date("2026-03-11"), "X").is_err());
    }

    #[test]
    fn test_non_positive_request_rejected() {
        assert!(matches!(
            plan_consumption(&shelf(), 0, date("2026-03-10"), "X"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_snapshot() {
        let snapshot = snapshot_of(&shelf(), date("2026-03-10"));
        assert_eq!(snapshot.quantity, 26);
        assert_eq!(snapshot.next_expiry, Some(date("2026-04-30")));
        assert_eq!(saleable_total(&shelf(), date("2026-03-10")), 26);

        let undated = vec![batch(1, None, BatchStatus::Active, 4)];
        assert_eq!(
            snapshot_of(&undated, date("2026-03-10")),
            StockSnapshot { quantity: 4, next_expiry: None }
        );
        assert_eq!(snapshot_of(&[], date("2026-03-10")), StockSnapshot::empty());
    }
}
