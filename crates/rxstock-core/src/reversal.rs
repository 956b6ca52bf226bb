//! # LIFO Reversal Planning
//!
//! Decides which usage rows give units back when a sale shrinks or is deleted.
//!
//! ```text
//! usage rows for sale 12, AMOX-250 (newest first)
//!
//!   usage 31  batch 4  qty 2   ◄── credited first
//!   usage 30  batch 9  qty 5
//!   usage 18  batch 4  qty 1
//!
//! reverse 4  →  usage 31: batch 4 +2 (row removed)
//!               usage 30: batch 9 +2 (row keeps 3)
//! ```
//!
//! Units always return to the exact batch they were taken from. Fewer units
//! than requested may come back; the caller decides whether that is fatal.

use serde::{Deserialize, Serialize};

use crate::types::SaleBatchUsage;

/// One credit against one usage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalStep {
    pub usage_id: i64,
    pub batch_id: i64,
    /// Units credited back to the batch.
    pub qty: i64,
    /// Units left on the usage row afterwards. Zero means the row goes.
    pub remaining: i64,
}

impl ReversalStep {
    pub const fn clears_row(&self) -> bool {
        self.remaining == 0
    }
}

/// Planned reversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalPlan {
    pub steps: Vec<ReversalStep>,
    pub returned: i64,
}

/// Plans giving back up to `requested` units, newest usage row first.
///
/// Rows may arrive in any order; they are walked by descending id.
pub fn plan_reversal(usages: &[SaleBatchUsage], requested: i64) -> ReversalPlan {
    let mut rows: Vec<&SaleBatchUsage> = usages.iter().filter(|u| u.qty > 0).collect();
    rows.sort_by(|a, b| b.id.cmp(&a.id));

    let mut plan = ReversalPlan::default();
    let mut remaining = requested.max(0);

    for row in rows {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(row.qty);
        plan.steps.push(ReversalStep {
            usage_id: row.id,
            batch_id: row.batch_id,
            qty: take,
            remaining: row.qty - take,
        });
        plan.returned += take;
        remaining -= take;
    }

    plan
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn usage(id: i64, batch_id: i64, qty: i64) -> SaleBatchUsage {
        SaleBatchUsage {
            id,
            sale_id: 12,
            sale_item_id: None,
            pharmacy_id: 1,
            pharmacy_product_id: 3,
            batch_id,
            barcode: "AMOX-250".to_string(),
            qty,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_newest_rows_credited_first() {
        let rows = vec![usage(18, 4, 1), usage(31, 4, 2), usage(30, 9, 5)];
        let plan = plan_reversal(&rows, 4);

        assert_eq!(plan.returned, 4);
        assert_eq!(
            plan.steps,
            vec![
                ReversalStep { usage_id: 31, batch_id: 4, qty: 2, remaining: 0 },
                ReversalStep { usage_id: 30, batch_id: 9, qty: 2, remaining: 3 },
            ]
        );
        assert!(plan.steps[0].clears_row());
        assert!(!plan.steps[1].clears_row());
    }

    #[test]
    fn test_short_ledger_returns_what_it_has() {
        let rows = vec![usage(1, 4, 2)];
        let plan = plan_reversal(&rows, 5);
        assert_eq!(plan.returned, 2);
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_full_reversal_clears_every_row() {
        let rows = vec![usage(1, 4, 2), usage(2, 5, 3)];
        let plan = plan_reversal(&rows, 5);
        assert_eq!(plan.returned, 5);
        assert!(plan.steps.iter().all(ReversalStep::clears_row));
    }

    #[test]
    fn test_zero_request_is_a_no_op() {
        let plan = plan_reversal(&[usage(1, 4, 2)], 0);
        assert_eq!(plan, ReversalPlan::default());
    }
}
