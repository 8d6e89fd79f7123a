//! 账期分类：采购日期 + 供应商结算策略 -> 分桶键与到期日
//! Period classifier. Pure and deterministic.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// 供应商结算方式 / Supplier settlement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementType {
    Immediate,
    Monthly,
    Flexible,
}

impl SettlementType {
    /// 缺失、空串或未知值均按 flexible
    /// Missing, empty or unrecognised values fall back to flexible.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("immediate") => SettlementType::Immediate,
            Some("monthly") => SettlementType::Monthly,
            _ => SettlementType::Flexible,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementType::Immediate => "immediate",
            SettlementType::Monthly => "monthly",
            SettlementType::Flexible => "flexible",
        }
    }
}

/// 分类结果 / Classification output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodKey {
    pub settlement_type: SettlementType,
    /// `YYYY-MM` 或空串
    pub period_month: String,
    /// `YYYY-H1` / `YYYY-H2` 或空串
    pub period_half: String,
    pub due_date: Option<NaiveDateTime>,
}

impl PeriodKey {
    /// 即时模式不参与聚合 / immediate payables are never aggregated
    pub fn is_immediate(&self) -> bool {
        self.settlement_type == SettlementType::Immediate
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// 月结到期日：次月 `day` 日 23:59:59，超出当月天数或为 0/空则取月末
/// Monthly due date: `day` of the following month at 23:59:59, clamped to month end.
pub fn monthly_due_date(purchase_date: NaiveDate, settlement_day: Option<i32>) -> Option<NaiveDateTime> {
    let (y, m) = if purchase_date.month() == 12 {
        (purchase_date.year() + 1, 1)
    } else {
        (purchase_date.year(), purchase_date.month() + 1)
    };
    let last = last_day_of_month(y, m);
    let day = match settlement_day {
        Some(d) if d >= 1 && (d as u32) <= last => d as u32,
        _ => last,
    };
    NaiveDate::from_ymd_opt(y, m, day).and_then(|d| d.and_hms_opt(23, 59, 59))
}

pub fn half_year_label(d: NaiveDate) -> String {
    format!("{:04}-{}", d.year(), if d.month() <= 6 { "H1" } else { "H2" })
}

pub fn classify(
    purchase_date: NaiveDate,
    settlement_type: SettlementType,
    settlement_day: Option<i32>,
) -> PeriodKey {
    match settlement_type {
        SettlementType::Immediate => PeriodKey {
            settlement_type,
            period_month: String::new(),
            period_half: String::new(),
            due_date: (purchase_date + Duration::days(30)).and_hms_opt(0, 0, 0),
        },
        SettlementType::Monthly => PeriodKey {
            settlement_type,
            period_month: purchase_date.format("%Y-%m").to_string(),
            period_half: String::new(),
            due_date: monthly_due_date(purchase_date, settlement_day),
        },
        SettlementType::Flexible => PeriodKey {
            settlement_type,
            period_month: String::new(),
            period_half: half_year_label(purchase_date),
            due_date: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dt(y: i32, m: u32, day: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        d(y, m, day).and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_defaults_to_flexible() {
        assert_eq!(SettlementType::parse(None), SettlementType::Flexible);
        assert_eq!(SettlementType::parse(Some("")), SettlementType::Flexible);
        assert_eq!(SettlementType::parse(Some("weekly")), SettlementType::Flexible);
        assert_eq!(SettlementType::parse(Some(" Monthly ")), SettlementType::Monthly);
        assert_eq!(SettlementType::parse(Some("immediate")), SettlementType::Immediate);
    }

    #[test]
    fn test_immediate_due_in_thirty_days() {
        let k = classify(d(2025, 1, 15), SettlementType::Immediate, None);
        assert!(k.is_immediate());
        assert_eq!(k.period_month, "");
        assert_eq!(k.period_half, "");
        assert_eq!(k.due_date, Some(dt(2025, 2, 14, 0, 0, 0)));
    }

    #[test]
    fn test_monthly_due_on_settlement_day_next_month() {
        let k = classify(d(2025, 3, 5), SettlementType::Monthly, Some(25));
        assert_eq!(k.period_month, "2025-03");
        assert_eq!(k.period_half, "");
        assert_eq!(k.due_date, Some(dt(2025, 4, 25, 23, 59, 59)));
    }

    #[test]
    fn test_monthly_due_day_clamps_to_month_end() {
        // 次月 4 月只有 30 天 / April has 30 days
        let k = classify(d(2025, 3, 31), SettlementType::Monthly, Some(31));
        assert_eq!(k.period_month, "2025-03");
        assert_eq!(k.due_date, Some(dt(2025, 4, 30, 23, 59, 59)));

        let k = classify(d(2024, 1, 10), SettlementType::Monthly, Some(0));
        assert_eq!(k.due_date, Some(dt(2024, 2, 29, 23, 59, 59)));

        let k = classify(d(2025, 1, 10), SettlementType::Monthly, None);
        assert_eq!(k.due_date, Some(dt(2025, 2, 28, 23, 59, 59)));
    }

    #[test]
    fn test_monthly_december_rolls_into_next_year() {
        let k = classify(d(2025, 12, 1), SettlementType::Monthly, Some(10));
        assert_eq!(k.period_month, "2025-12");
        assert_eq!(k.due_date, Some(dt(2026, 1, 10, 23, 59, 59)));
    }

    #[test]
    fn test_flexible_half_year_boundaries() {
        let june = classify(d(2025, 6, 30), SettlementType::Flexible, Some(5));
        let july = classify(d(2025, 7, 1), SettlementType::Flexible, None);
        assert_eq!(june.period_half, "2025-H1");
        assert_eq!(july.period_half, "2025-H2");
        assert_eq!(june.period_month, "");
        assert_eq!(june.due_date, None);
    }

    #[test]
    fn test_month_boundary_belongs_to_that_month() {
        let first = classify(d(2025, 5, 1), SettlementType::Monthly, Some(1));
        let last = classify(d(2025, 5, 31), SettlementType::Monthly, Some(1));
        assert_eq!(first.period_month, "2025-05");
        assert_eq!(last.period_month, "2025-05");
        assert_eq!(first, last);
    }
}
