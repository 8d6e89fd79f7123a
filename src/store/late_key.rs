//! 测试用存储包装：第一个事务查不到指定幂等键
//! Test store whose first transaction cannot see one idempotency key, as if a concurrent
//! request committed that key between our lookup and our insert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use v::db::error::Result as DbResult;

use super::model::*;
use super::{MemoryStore, Store, StoreTx};

#[derive(Clone)]
pub struct LateKeyStore {
    inner: MemoryStore,
    key: String,
    armed: Arc<AtomicBool>,
}

impl LateKeyStore {
    pub fn new(inner: MemoryStore, key: &str) -> Self {
        Self {
            inner,
            key: key.to_string(),
            armed: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait]
impl Store for LateKeyStore {
    async fn begin(&self) -> DbResult<Box<dyn StoreTx>> {
        let inner = self.inner.begin().await?;
        let hidden = self
            .armed
            .swap(false, Ordering::SeqCst)
            .then(|| self.key.clone());
        Ok(Box::new(LateKeyTx { inner, hidden }))
    }

    async fn migrate(&self) -> DbResult<()> {
        self.inner.migrate().await
    }

    async fn ping(&self) -> DbResult<()> {
        self.inner.ping().await
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct LateKeyTx {
    inner: Box<dyn StoreTx>,
    hidden: Option<String>,
}

#[async_trait]
impl StoreTx for LateKeyTx {
    async fn find_idempotency(&mut self, resource: &str, key: &str) -> DbResult<Option<i64>> {
        if self.hidden.as_deref() == Some(key) {
            return Ok(None);
        }
        self.inner.find_idempotency(resource, key).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.inner.rollback().await
    }

    async fn get_base(&mut self, id: i64) -> DbResult<Option<BaseRow>> {
        self.inner.get_base(id).await
    }

    async fn base_ids_by_names(&mut self, names: &[String]) -> DbResult<Vec<i64>> {
        self.inner.base_ids_by_names(names).await
    }

    async fn get_supplier(&mut self, id: i64) -> DbResult<Option<SupplierRow>> {
        self.inner.get_supplier(id).await
    }

    async fn get_product(&mut self, id: i64) -> DbResult<Option<ProductRow>> {
        self.inner.get_product(id).await
    }

    async fn find_product_by_name(&mut self, name: &str) -> DbResult<Option<ProductRow>> {
        self.inner.find_product_by_name(name).await
    }

    async fn insert_product(&mut self, product: &NewProduct) -> DbResult<i64> {
        self.inner.insert_product(product).await
    }

    async fn get_purchase_param(&mut self, product_id: i64) -> DbResult<Option<PurchaseParamRow>> {
        self.inner.get_purchase_param(product_id).await
    }

    async fn get_unit_spec(
        &mut self,
        product_id: i64,
        unit: &str,
    ) -> DbResult<Option<UnitSpecRow>> {
        self.inner.get_unit_spec(product_id, unit).await
    }

    async fn latest_supplier_price(
        &mut self,
        supplier_id: i64,
        product_id: i64,
        on: NaiveDate,
    ) -> DbResult<Option<f64>> {
        self.inner.latest_supplier_price(supplier_id, product_id, on).await
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> DbResult<i64> {
        self.inner.insert_purchase(purchase).await
    }

    async fn get_purchase(&mut self, id: i64, for_update: bool) -> DbResult<Option<PurchaseRow>> {
        self.inner.get_purchase(id, for_update).await
    }

    async fn update_purchase(&mut self, id: i64, purchase: &NewPurchase) -> DbResult<()> {
        self.inner.update_purchase(id, purchase).await
    }

    async fn delete_purchase(&mut self, id: i64) -> DbResult<()> {
        self.inner.delete_purchase(id).await
    }

    async fn insert_purchase_items(
        &mut self,
        purchase_id: i64,
        items: &[NewPurchaseItem],
    ) -> DbResult<()> {
        self.inner.insert_purchase_items(purchase_id, items).await
    }

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> DbResult<()> {
        self.inner.delete_purchase_items(purchase_id).await
    }

    async fn list_purchase_items(&mut self, purchase_id: i64) -> DbResult<Vec<PurchaseItemRow>> {
        self.inner.list_purchase_items(purchase_id).await
    }

    async fn lock_bucket(&mut self, supplier_id: i64, base_id: i64) -> DbResult<()> {
        self.inner.lock_bucket(supplier_id, base_id).await
    }

    async fn find_open_payable(&mut self, bucket: &PayableBucket) -> DbResult<Option<PayableRow>> {
        self.inner.find_open_payable(bucket).await
    }

    async fn insert_payable(&mut self, payable: &NewPayable) -> DbResult<i64> {
        self.inner.insert_payable(payable).await
    }

    async fn get_payable(&mut self, id: i64, for_update: bool) -> DbResult<Option<PayableRow>> {
        self.inner.get_payable(id, for_update).await
    }

    async fn find_payable_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<PayableRow>> {
        self.inner.find_payable_by_purchase(purchase_id).await
    }

    async fn update_payable_totals(
        &mut self,
        id: i64,
        totals: &PayableTotals,
        status: &str,
    ) -> DbResult<()> {
        self.inner.update_payable_totals(id, totals, status).await
    }

    async fn update_payable_due_date(
        &mut self,
        id: i64,
        due_date: Option<chrono::NaiveDateTime>,
    ) -> DbResult<()> {
        self.inner.update_payable_due_date(id, due_date).await
    }

    async fn delete_payable(&mut self, id: i64) -> DbResult<()> {
        self.inner.delete_payable(id).await
    }

    async fn get_payable_view(&mut self, id: i64) -> DbResult<Option<PayableView>> {
        self.inner.get_payable_view(id).await
    }

    async fn list_payables(&mut self, filter: &PayableFilter) -> DbResult<(Vec<PayableView>, u64)> {
        self.inner.list_payables(filter).await
    }

    async fn insert_link(&mut self, link: &NewLink) -> DbResult<i64> {
        self.inner.insert_link(link).await
    }

    async fn find_link_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<LinkRow>> {
        self.inner.find_link_by_purchase(purchase_id).await
    }

    async fn list_links(&mut self, payable_id: i64) -> DbResult<Vec<LinkRow>> {
        self.inner.list_links(payable_id).await
    }

    async fn sum_links(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        self.inner.sum_links(payable_id).await
    }

    async fn update_link_amount(
        &mut self,
        link_id: i64,
        amount: f64,
        currency: &str,
    ) -> DbResult<()> {
        self.inner.update_link_amount(link_id, amount, currency).await
    }

    async fn delete_link(&mut self, link_id: i64) -> DbResult<()> {
        self.inner.delete_link(link_id).await
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> DbResult<i64> {
        self.inner.insert_payment(payment).await
    }

    async fn get_payment(&mut self, id: i64) -> DbResult<Option<PaymentRow>> {
        self.inner.get_payment(id).await
    }

    async fn delete_payment(&mut self, id: i64) -> DbResult<()> {
        self.inner.delete_payment(id).await
    }

    async fn delete_payments_for_payable(&mut self, payable_id: i64) -> DbResult<u64> {
        self.inner.delete_payments_for_payable(payable_id).await
    }

    async fn list_payments(&mut self, payable_id: i64) -> DbResult<Vec<PaymentRow>> {
        self.inner.list_payments(payable_id).await
    }

    async fn sum_payments(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        self.inner.sum_payments(payable_id).await
    }

    async fn insert_idempotency(&mut self, resource: &str, key: &str, ref_id: i64) -> DbResult<()> {
        self.inner.insert_idempotency(resource, key, ref_id).await
    }

    async fn rebuild_monthly_rollup(
        &mut self,
        month: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<RollupCounts> {
        self.inner.rebuild_monthly_rollup(month, start, end).await
    }

    async fn find_user(&mut self, username: &str) -> DbResult<Option<UserRow>> {
        self.inner.find_user(username).await
    }

    async fn insert_user(&mut self, user: &NewUser) -> DbResult<i64> {
        self.inner.insert_user(user).await
    }
}
