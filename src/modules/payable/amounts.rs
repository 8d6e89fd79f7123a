//! 应付金额与状态推导（唯一入口）
//! The one place where remaining amount and status are derived from totals.

use serde::{Deserialize, Serialize};

use crate::comm::serde_fmt::round2;
use crate::store::PayableTotals;

/// 视为已结清的容差 / tolerance below which a payable counts as settled
pub const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayableStatus {
    Pending,
    Partial,
    Paid,
}

impl PayableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayableStatus::Pending => "pending",
            PayableStatus::Partial => "partial",
            PayableStatus::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PayableStatus::Pending),
            "partial" => Some(PayableStatus::Partial),
            "paid" => Some(PayableStatus::Paid),
            _ => None,
        }
    }
}

/// (total, paid) -> (remaining, status)
pub fn derive_amounts(total: f64, paid: f64) -> (PayableTotals, PayableStatus) {
    let total = round2(total);
    let paid = round2(paid);
    let remaining = round2(total - paid);
    let (remaining, status) = if remaining <= EPSILON {
        (0.0, PayableStatus::Paid)
    } else if paid > 0.0 {
        (remaining, PayableStatus::Partial)
    } else {
        (remaining, PayableStatus::Pending)
    };
    (
        PayableTotals {
            total_amount: total,
            paid_amount: paid,
            remaining_amount: remaining,
        },
        status,
    )
}
