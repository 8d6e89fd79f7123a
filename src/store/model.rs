//! 持久化行结构与写入参数
//! Row types read from, and parameter types written to, the store.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::comm::serde_fmt::{datetime, option_datetime};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BaseRow {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SupplierRow {
    pub id: i64,
    pub name: String,
    /// immediate / monthly / flexible；为空按 flexible 处理
    pub settlement_type: Option<String>,
    pub settlement_day: Option<i32>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub base_unit: String,
    pub supplier_id: Option<i64>,
    pub unit_price: f64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub base_unit: String,
    pub supplier_id: Option<i64>,
    pub unit_price: f64,
    pub status: String,
}

/// 1 `unit` = `factor_to_base` 个基础单位
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnitSpecRow {
    pub product_id: i64,
    pub unit: String,
    pub factor_to_base: f64,
    pub kind: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PurchaseParamRow {
    pub product_id: i64,
    pub unit: String,
    pub factor_to_base: f64,
    pub purchase_price: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PurchaseRow {
    pub id: i64,
    pub supplier_id: i64,
    pub base_id: i64,
    pub purchase_date: NaiveDate,
    pub total_amount: f64,
    pub currency: String,
    pub order_number: String,
    pub receiver: String,
    #[serde(with = "datetime")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub supplier_id: i64,
    pub base_id: i64,
    pub purchase_date: NaiveDate,
    pub total_amount: f64,
    pub currency: String,
    pub order_number: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PurchaseItemRow {
    pub id: i64,
    pub purchase_entry_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
    pub quantity_base: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseItem {
    pub product_id: i64,
    pub product_name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
    pub quantity_base: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PayableRow {
    pub id: i64,
    pub supplier_id: Option<i64>,
    pub base_id: i64,
    /// 仅即时结算模式设置 / set only in immediate mode
    pub purchase_entry_id: Option<i64>,
    pub settlement_type: String,
    pub period_month: String,
    pub period_half: String,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
    pub currency: String,
    pub status: String,
    #[serde(with = "option_datetime")]
    pub due_date: Option<NaiveDateTime>,
    #[serde(with = "datetime")]
    pub created_at: NaiveDateTime,
}

impl PayableRow {
    pub fn is_immediate(&self) -> bool {
        self.purchase_entry_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewPayable {
    pub supplier_id: Option<i64>,
    pub base_id: i64,
    pub purchase_entry_id: Option<i64>,
    pub settlement_type: String,
    pub period_month: String,
    pub period_half: String,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
    pub currency: String,
    pub status: String,
    pub due_date: Option<NaiveDateTime>,
}

/// 聚合应付的分桶键 / Aggregate bucket key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayableBucket {
    pub supplier_id: i64,
    pub base_id: i64,
    pub settlement_type: String,
    pub period_month: String,
    pub period_half: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayableTotals {
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
}

/// 列表/详情使用的带名称视图 / Payable joined with display names
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PayableView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: PayableRow,
    pub supplier_name: Option<String>,
    pub base_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PayableFilter {
    /// 供应商名称模糊匹配 / supplier name substring
    pub supplier_name: Option<String>,
    pub status: Option<String>,
    /// 基地名称精确匹配 / exact base name
    pub base_name: Option<String>,
    pub created_from: Option<NaiveDateTime>,
    pub created_to: Option<NaiveDateTime>,
    /// None 表示不限基地 / None means every base
    pub base_ids: Option<Vec<i64>>,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LinkRow {
    pub id: i64,
    pub payable_record_id: i64,
    pub purchase_entry_id: i64,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewLink {
    pub payable_record_id: i64,
    pub purchase_entry_id: i64,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub payable_record_id: i64,
    pub payment_amount: f64,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference_number: String,
    pub notes: String,
    pub currency: String,
    #[serde(with = "datetime")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payable_record_id: i64,
    pub payment_amount: f64,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference_number: String,
    pub notes: String,
    pub currency: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    /// 逗号分隔的基地名称 / comma separated base names
    pub bases: String,
}

impl UserRow {
    pub fn base_names(&self) -> Vec<String> {
        self.bases
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub bases: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SupplierMonthlySpendRow {
    pub supplier_id: i64,
    pub base_id: i64,
    pub month: String,
    pub total_purchase: f64,
    pub purchase_count: i64,
    pub total_paid: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BaseExpenseMonthRow {
    pub base_id: i64,
    pub month: String,
    pub total_amount: f64,
}

/// 单月重建结果 / Rows written by one monthly rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct RollupCounts {
    pub supplier_rows: u64,
    pub expense_rows: u64,
}
