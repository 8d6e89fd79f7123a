//! 月度物化汇总重建
//! Monthly materialised rollups: supplier spend and base expense per month.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, Months, NaiveDate};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::comm::serde_fmt::{parse_month, MONTH_FMT};
use crate::modules::error::{ServiceError, ServiceResult};
use crate::modules::tx::finish;
use crate::store::{RollupCounts, Store};

/// 范围重建上限，防止误传超长区间
pub const MAX_RANGE_MONTHS: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct MonthRefresh {
    pub month: String,
    #[serde(flatten)]
    pub counts: RollupCounts,
}

fn month_start(raw: &str) -> ServiceResult<NaiveDate> {
    parse_month(raw).ok_or_else(|| ServiceError::BadRequest(format!("月份格式应为 YYYY-MM: {}", raw)))
}

fn next_month(first: NaiveDate) -> ServiceResult<NaiveDate> {
    first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| ServiceError::BadRequest(format!("月份越界: {}", first)))
}

/// 闭区间内的全部月份 / Every month in the inclusive range, as first days
pub fn months_between(start: &str, end: &str) -> ServiceResult<Vec<NaiveDate>> {
    let first = month_start(start)?;
    let last = month_start(end)?;
    if first > last {
        return Err(ServiceError::BadRequest(format!(
            "起始月份 {} 晚于结束月份 {}",
            start, end
        )));
    }
    let mut months = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        if months.len() >= MAX_RANGE_MONTHS {
            return Err(ServiceError::BadRequest(format!(
                "区间超过 {} 个月",
                MAX_RANGE_MONTHS
            )));
        }
        months.push(cursor);
        cursor = next_month(cursor)?;
    }
    Ok(months)
}

async fn refresh_one(store: &dyn Store, first: NaiveDate) -> ServiceResult<MonthRefresh> {
    let month = first.format(MONTH_FMT).to_string();
    let end = next_month(first)?;
    let mut tx = store.begin().await?;
    let result = tx
        .rebuild_monthly_rollup(&month, first, end)
        .await
        .map_err(ServiceError::from);
    let counts = finish(tx, result).await?;
    info!(
        month = %month,
        supplier_rows = counts.supplier_rows,
        expense_rows = counts.expense_rows,
        "monthly rollup rebuilt"
    );
    Ok(MonthRefresh { month, counts })
}

/// 重建单月汇总（先删后插，单事务）
pub async fn recompute_monthly(store: &dyn Store, month: &str) -> ServiceResult<MonthRefresh> {
    refresh_one(store, month_start(month)?).await
}

/// 按月依次重建闭区间 [start, end]
pub async fn recompute_range(
    store: &dyn Store,
    start: &str,
    end: &str,
) -> ServiceResult<Vec<MonthRefresh>> {
    let mut out = Vec::new();
    for first in months_between(start, end)? {
        out.push(refresh_one(store, first).await?);
    }
    Ok(out)
}

pub fn current_month() -> String {
    let today = Local::now().date_naive();
    format!("{:04}-{:02}", today.year(), today.month())
}

/// 后台定时刷新当月汇总 / Background task refreshing the current month on a fixed interval
pub fn spawn_refresher(store: Arc<dyn Store>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "monthly rollup refresher started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let month = current_month();
            if let Err(e) = recompute_monthly(store.as_ref(), &month).await {
                error!(month = %month, error = %e, "monthly rollup refresh failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::base::scope::AccessScope;
    use crate::modules::payment::applicator::{create_payment, PaymentInput};
    use crate::modules::purchase::resolver::LineInput;
    use crate::modules::purchase::service::{create_purchase, PurchaseInput};
    use crate::modules::tx::LedgerSettings;
    use crate::store::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn purchase(supplier_id: i64, base_id: i64, date: NaiveDate, total: f64) -> PurchaseInput {
        PurchaseInput {
            supplier_id,
            base_id,
            purchase_date: date,
            total_amount: total,
            currency: None,
            order_number: String::new(),
            receiver: String::new(),
            items: vec![LineInput {
                product_name: "Rice".to_string(),
                unit: "kg".to_string(),
                quantity: 1.0,
                unit_price: total,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_months_between() {
        let months = months_between("2024-11", "2025-02").unwrap();
        assert_eq!(months.len(), 4);
        assert_eq!(months[0], d(2024, 11, 1));
        assert_eq!(months[3], d(2025, 2, 1));

        assert_eq!(months_between("2025-03", "2025-03").unwrap().len(), 1);
        assert_eq!(
            months_between("2025-04", "2025-03").unwrap_err().reason(),
            "bad-request"
        );
        assert!(months_between("2025-3", "2025-04").is_err());
        assert!(months_between("2000-01", "2030-01").is_err());
    }

    #[tokio::test]
    async fn test_recompute_monthly_rolls_up_purchases_payments_and_expenses() {
        let store = MemoryStore::new();
        let base = store.add_base("Vientiane", "VTE", "CNY").await;
        let supplier = store.add_supplier("Fresh Co", Some("immediate"), None).await;
        store.add_expense(base, d(2025, 3, 3), 120.0).await;
        store.add_expense(base, d(2025, 3, 28), 30.5).await;
        store.add_expense(base, d(2025, 4, 1), 999.0).await;

        let settings = LedgerSettings::default();
        let scope = AccessScope::All;
        let first = create_purchase(&store, &settings, &scope, &purchase(supplier, base, d(2025, 3, 5), 400.0), None)
            .await
            .unwrap();
        create_purchase(&store, &settings, &scope, &purchase(supplier, base, d(2025, 3, 20), 600.0), None)
            .await
            .unwrap();
        create_purchase(&store, &settings, &scope, &purchase(supplier, base, d(2025, 4, 2), 50.0), None)
            .await
            .unwrap();
        let pay = |amount: f64, payment_date: NaiveDate| PaymentInput {
            payable_id: first.payable_id.unwrap(),
            amount,
            payment_date,
            payment_method: "bank".to_string(),
            reference: String::new(),
            notes: String::new(),
        };
        // 按录入时间归月：三月录入、四月付款日的计入三月，反之不计
        // payments fall into the month they were recorded in, whatever their payment_date
        let recorded_in_march = create_payment(&store, &settings, &scope, &pay(250.0, d(2025, 4, 2)), None)
            .await
            .unwrap();
        store
            .backdate_payment(recorded_in_march.id, d(2025, 3, 30).and_hms_opt(10, 0, 0).unwrap())
            .await;
        let recorded_in_april = create_payment(&store, &settings, &scope, &pay(100.0, d(2025, 3, 31)), None)
            .await
            .unwrap();
        store
            .backdate_payment(recorded_in_april.id, d(2025, 4, 1).and_hms_opt(0, 0, 0).unwrap())
            .await;

        let refreshed = recompute_monthly(&store, "2025-03").await.unwrap();
        assert_eq!(refreshed.counts.supplier_rows, 1);
        assert_eq!(refreshed.counts.expense_rows, 1);

        let spend = store.supplier_monthly_spend("2025-03").await;
        assert_eq!(spend.len(), 1);
        assert_eq!(spend[0].total_purchase, 1000.0);
        assert_eq!(spend[0].purchase_count, 2);
        assert_eq!(spend[0].total_paid, 250.0);
        assert_eq!(spend[0].remaining, 750.0);

        let expense = store.base_expense_month("2025-03").await;
        assert_eq!(expense[0].total_amount, 150.5);

        // 重跑幂等 / rerun replaces rather than appends
        recompute_monthly(&store, "2025-03").await.unwrap();
        assert_eq!(store.supplier_monthly_spend("2025-03").await.len(), 1);
    }

    #[tokio::test]
    async fn test_recompute_range_covers_each_month() {
        let store = MemoryStore::new();
        let base = store.add_base("Vientiane", "VTE", "CNY").await;
        store.add_expense(base, d(2025, 1, 9), 10.0).await;
        store.add_expense(base, d(2025, 3, 9), 30.0).await;

        let out = recompute_range(&store, "2025-01", "2025-03").await.unwrap();
        let months: Vec<&str> = out.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(out[1].counts, RollupCounts::default());
        assert_eq!(store.base_expense_month("2025-03").await[0].total_amount, 30.0);
    }
}
