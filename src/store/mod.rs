//! 持久化网关
//! Persistence gateway: transactional scopes, row locks, unique-index signalling.
//!
//! 所有核心写操作都在一个 `StoreTx` 内完成；未提交即被丢弃的事务等同回滚。
//! Every core mutation runs inside one `StoreTx`; dropping it uncommitted rolls back.

#[cfg(test)]
pub mod late_key;
pub mod memory;
pub mod model;
pub mod mysql;
pub mod schema;

use async_trait::async_trait;
use chrono::NaiveDate;
use v::db::error::Result as DbResult;

pub use memory::MemoryStore;
pub use model::*;
pub use mysql::MySqlStore;

/// 事务工厂 / Transaction factory
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> DbResult<Box<dyn StoreTx>>;

    /// 建表（幂等） / Idempotent schema bootstrap
    async fn migrate(&self) -> DbResult<()>;

    async fn ping(&self) -> DbResult<()>;

    fn backend(&self) -> &'static str;
}

/// 单个事务内可用的操作
/// Operations available inside one transaction.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(&mut self) -> DbResult<()>;
    async fn rollback(&mut self) -> DbResult<()>;

    // ---- 参考数据 / reference data ----
    async fn get_base(&mut self, id: i64) -> DbResult<Option<BaseRow>>;
    async fn base_ids_by_names(&mut self, names: &[String]) -> DbResult<Vec<i64>>;
    async fn get_supplier(&mut self, id: i64) -> DbResult<Option<SupplierRow>>;
    async fn get_product(&mut self, id: i64) -> DbResult<Option<ProductRow>>;
    async fn find_product_by_name(&mut self, name: &str) -> DbResult<Option<ProductRow>>;
    async fn insert_product(&mut self, product: &NewProduct) -> DbResult<i64>;
    async fn get_purchase_param(&mut self, product_id: i64) -> DbResult<Option<PurchaseParamRow>>;
    async fn get_unit_spec(&mut self, product_id: i64, unit: &str) -> DbResult<Option<UnitSpecRow>>;
    /// `effective_from <= on` 中最新的一条价格
    async fn latest_supplier_price(
        &mut self,
        supplier_id: i64,
        product_id: i64,
        on: NaiveDate,
    ) -> DbResult<Option<f64>>;

    // ---- 采购 / purchases ----
    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> DbResult<i64>;
    async fn get_purchase(&mut self, id: i64, for_update: bool) -> DbResult<Option<PurchaseRow>>;
    async fn update_purchase(&mut self, id: i64, purchase: &NewPurchase) -> DbResult<()>;
    async fn delete_purchase(&mut self, id: i64) -> DbResult<()>;
    async fn insert_purchase_items(
        &mut self,
        purchase_id: i64,
        items: &[NewPurchaseItem],
    ) -> DbResult<()>;
    async fn delete_purchase_items(&mut self, purchase_id: i64) -> DbResult<()>;
    async fn list_purchase_items(&mut self, purchase_id: i64) -> DbResult<Vec<PurchaseItemRow>>;

    // ---- 应付 / payables ----
    /// 对 (supplier_id, base_id) 范围内的应付加排他锁
    /// Exclusive range lock over payables of one (supplier, base).
    async fn lock_bucket(&mut self, supplier_id: i64, base_id: i64) -> DbResult<()>;
    async fn find_open_payable(&mut self, bucket: &PayableBucket) -> DbResult<Option<PayableRow>>;
    async fn insert_payable(&mut self, payable: &NewPayable) -> DbResult<i64>;
    async fn get_payable(&mut self, id: i64, for_update: bool) -> DbResult<Option<PayableRow>>;
    /// 即时模式下绑定到该采购的应付 / Immediate payable pinned to a purchase
    async fn find_payable_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<PayableRow>>;
    async fn update_payable_totals(
        &mut self,
        id: i64,
        totals: &PayableTotals,
        status: &str,
    ) -> DbResult<()>;
    async fn update_payable_due_date(
        &mut self,
        id: i64,
        due_date: Option<chrono::NaiveDateTime>,
    ) -> DbResult<()>;
    async fn delete_payable(&mut self, id: i64) -> DbResult<()>;
    async fn get_payable_view(&mut self, id: i64) -> DbResult<Option<PayableView>>;
    async fn list_payables(&mut self, filter: &PayableFilter) -> DbResult<(Vec<PayableView>, u64)>;

    // ---- 关联 / links ----
    async fn insert_link(&mut self, link: &NewLink) -> DbResult<i64>;
    async fn find_link_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<LinkRow>>;
    async fn list_links(&mut self, payable_id: i64) -> DbResult<Vec<LinkRow>>;
    /// (Σ amount, 条数) / (sum, count)
    async fn sum_links(&mut self, payable_id: i64) -> DbResult<(f64, i64)>;
    async fn update_link_amount(&mut self, link_id: i64, amount: f64, currency: &str)
        -> DbResult<()>;
    async fn delete_link(&mut self, link_id: i64) -> DbResult<()>;

    // ---- 付款 / payments ----
    async fn insert_payment(&mut self, payment: &NewPayment) -> DbResult<i64>;
    async fn get_payment(&mut self, id: i64) -> DbResult<Option<PaymentRow>>;
    async fn delete_payment(&mut self, id: i64) -> DbResult<()>;
    async fn delete_payments_for_payable(&mut self, payable_id: i64) -> DbResult<u64>;
    async fn list_payments(&mut self, payable_id: i64) -> DbResult<Vec<PaymentRow>>;
    /// (Σ payment_amount, 条数) / (sum, count)
    async fn sum_payments(&mut self, payable_id: i64) -> DbResult<(f64, i64)>;

    // ---- 幂等键 / idempotency ----
    async fn find_idempotency(&mut self, resource: &str, key: &str) -> DbResult<Option<i64>>;
    /// 键冲突时返回 `DbError::UniqueViolation`
    async fn insert_idempotency(&mut self, resource: &str, key: &str, ref_id: i64) -> DbResult<()>;

    // ---- 物化汇总 / materialised rollups ----
    /// 删除并重建 `month` 的两张汇总表，`[start, end)` 为该月日期范围
    async fn rebuild_monthly_rollup(
        &mut self,
        month: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<RollupCounts>;

    // ---- 用户 / users ----
    async fn find_user(&mut self, username: &str) -> DbResult<Option<UserRow>>;
    async fn insert_user(&mut self, user: &NewUser) -> DbResult<i64>;
}
