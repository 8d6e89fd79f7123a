//! 内存实现：与 MySQL 实现同一契约，用于测试与 `--memory` 开发模式
//! In-process store with the MySQL contract. Transactions are serialisable: the
//! state mutex is held for the lifetime of a transaction, writes go to a working
//! copy that replaces the committed state on commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use v::db::error::{DbError, Result as DbResult};

use super::model::*;
use super::{Store, StoreTx};
use crate::comm::serde_fmt::round2;

#[derive(Debug, Clone)]
struct SupplierPrice {
    supplier_id: i64,
    product_id: i64,
    price: f64,
    effective_from: NaiveDate,
}

#[derive(Debug, Clone)]
struct BaseExpense {
    base_id: i64,
    expense_date: NaiveDate,
    amount: f64,
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    resource: String,
    ref_id: i64,
}

#[derive(Debug, Clone, Default)]
struct MemState {
    next_id: i64,
    bases: BTreeMap<i64, BaseRow>,
    suppliers: BTreeMap<i64, SupplierRow>,
    products: BTreeMap<i64, ProductRow>,
    unit_specs: Vec<UnitSpecRow>,
    purchase_params: Vec<PurchaseParamRow>,
    supplier_prices: Vec<SupplierPrice>,
    purchases: BTreeMap<i64, PurchaseRow>,
    items: BTreeMap<i64, PurchaseItemRow>,
    payables: BTreeMap<i64, PayableRow>,
    links: BTreeMap<i64, LinkRow>,
    payments: BTreeMap<i64, PaymentRow>,
    idempotency: BTreeMap<String, IdempotencyEntry>,
    users: BTreeMap<i64, UserRow>,
    expenses: Vec<BaseExpense>,
    mv_supplier_spend: Vec<SupplierMonthlySpendRow>,
    mv_base_expense: Vec<BaseExpenseMonthRow>,
}

fn unique(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

impl MemState {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn view(&self, p: &PayableRow) -> Option<PayableView> {
        let base = self.bases.get(&p.base_id)?;
        Some(PayableView {
            record: p.clone(),
            supplier_name: p
                .supplier_id
                .and_then(|sid| self.suppliers.get(&sid))
                .map(|s| s.name.clone()),
            base_name: base.name.clone(),
        })
    }

    fn matches(&self, view: &PayableView, f: &PayableFilter) -> bool {
        let p = &view.record;
        if let Some(name) = f.supplier_name.as_deref().filter(|s| !s.is_empty()) {
            match &view.supplier_name {
                Some(s) if s.contains(name) => {}
                _ => return false,
            }
        }
        if let Some(status) = f.status.as_deref().filter(|s| !s.is_empty()) {
            if p.status != status {
                return false;
            }
        }
        if let Some(base) = f.base_name.as_deref().filter(|s| !s.is_empty()) {
            if view.base_name != base {
                return false;
            }
        }
        if let Some(from) = f.created_from {
            if p.created_at < from {
                return false;
            }
        }
        if let Some(to) = f.created_to {
            if p.created_at > to {
                return false;
            }
        }
        if let Some(ids) = &f.base_ids {
            if !ids.contains(&p.base_id) {
                return false;
            }
        }
        true
    }
}

/// 内存存储 / In-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- 种子数据（不经过事务） / seeding, outside transactions ----

    pub async fn add_base(&self, name: &str, code: &str, currency: &str) -> i64 {
        let mut s = self.state.lock().await;
        let id = s.id();
        s.bases.insert(
            id,
            BaseRow {
                id,
                name: name.to_string(),
                code: code.to_string(),
                currency: currency.to_string(),
            },
        );
        id
    }

    pub async fn add_supplier(
        &self,
        name: &str,
        settlement_type: Option<&str>,
        settlement_day: Option<i32>,
    ) -> i64 {
        let mut s = self.state.lock().await;
        let id = s.id();
        s.suppliers.insert(
            id,
            SupplierRow {
                id,
                name: name.to_string(),
                settlement_type: settlement_type.map(str::to_string),
                settlement_day,
            },
        );
        id
    }

    pub async fn add_product(
        &self,
        name: &str,
        base_unit: &str,
        supplier_id: Option<i64>,
        unit_price: f64,
    ) -> i64 {
        let mut s = self.state.lock().await;
        let id = s.id();
        s.products.insert(
            id,
            ProductRow {
                id,
                name: name.to_string(),
                base_unit: base_unit.to_string(),
                supplier_id,
                unit_price,
                status: "active".to_string(),
            },
        );
        id
    }

    pub async fn add_unit_spec(&self, product_id: i64, unit: &str, factor_to_base: f64) {
        let mut s = self.state.lock().await;
        s.unit_specs.retain(|u| !(u.product_id == product_id && u.unit == unit));
        s.unit_specs.push(UnitSpecRow {
            product_id,
            unit: unit.to_string(),
            factor_to_base,
            kind: "both".to_string(),
            is_default: false,
        });
    }

    pub async fn add_purchase_param(
        &self,
        product_id: i64,
        unit: &str,
        factor_to_base: f64,
        purchase_price: f64,
    ) {
        let mut s = self.state.lock().await;
        s.purchase_params.retain(|p| p.product_id != product_id);
        s.purchase_params.push(PurchaseParamRow {
            product_id,
            unit: unit.to_string(),
            factor_to_base,
            purchase_price,
        });
    }

    pub async fn add_supplier_price(
        &self,
        supplier_id: i64,
        product_id: i64,
        price: f64,
        effective_from: NaiveDate,
    ) {
        let mut s = self.state.lock().await;
        s.supplier_prices.push(SupplierPrice {
            supplier_id,
            product_id,
            price,
            effective_from,
        });
    }

    pub async fn add_expense(&self, base_id: i64, expense_date: NaiveDate, amount: f64) {
        let mut s = self.state.lock().await;
        s.expenses.push(BaseExpense {
            base_id,
            expense_date,
            amount,
        });
    }

    /// 改写付款的录入时间（月汇总按录入时间归月） / rewrite when a payment was recorded
    pub async fn backdate_payment(&self, payment_id: i64, created_at: NaiveDateTime) {
        let mut s = self.state.lock().await;
        if let Some(p) = s.payments.get_mut(&payment_id) {
            p.created_at = created_at;
        }
    }

    // ---- 快照（用于断言） / snapshots ----

    pub async fn payables(&self) -> Vec<PayableRow> {
        self.state.lock().await.payables.values().cloned().collect()
    }

    pub async fn links(&self) -> Vec<LinkRow> {
        self.state.lock().await.links.values().cloned().collect()
    }

    pub async fn payments(&self) -> Vec<PaymentRow> {
        self.state.lock().await.payments.values().cloned().collect()
    }

    pub async fn purchases(&self) -> Vec<PurchaseRow> {
        self.state.lock().await.purchases.values().cloned().collect()
    }

    pub async fn purchase_items(&self) -> Vec<PurchaseItemRow> {
        self.state.lock().await.items.values().cloned().collect()
    }

    pub async fn products(&self) -> Vec<ProductRow> {
        self.state.lock().await.products.values().cloned().collect()
    }

    pub async fn supplier_monthly_spend(&self, month: &str) -> Vec<SupplierMonthlySpendRow> {
        let s = self.state.lock().await;
        s.mv_supplier_spend
            .iter()
            .filter(|r| r.month == month)
            .cloned()
            .collect()
    }

    pub async fn base_expense_month(&self, month: &str) -> Vec<BaseExpenseMonthRow> {
        let s = self.state.lock().await;
        s.mv_base_expense
            .iter()
            .filter(|r| r.month == month)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> DbResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work: Some(work),
        }))
    }

    async fn migrate(&self) -> DbResult<()> {
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    work: Option<MemState>,
}

impl MemoryTx {
    fn state(&mut self) -> DbResult<&mut MemState> {
        self.work
            .as_mut()
            .ok_or_else(|| DbError::Tx("事务已结束 / transaction already finished".to_string()))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(&mut self) -> DbResult<()> {
        let work = self
            .work
            .take()
            .ok_or_else(|| DbError::Tx("事务已结束 / transaction already finished".to_string()))?;
        *self.guard = work;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.work = None;
        Ok(())
    }

    async fn get_base(&mut self, id: i64) -> DbResult<Option<BaseRow>> {
        Ok(self.state()?.bases.get(&id).cloned())
    }

    async fn base_ids_by_names(&mut self, names: &[String]) -> DbResult<Vec<i64>> {
        let s = self.state()?;
        Ok(s.bases
            .values()
            .filter(|b| names.contains(&b.name))
            .map(|b| b.id)
            .collect())
    }

    async fn get_supplier(&mut self, id: i64) -> DbResult<Option<SupplierRow>> {
        Ok(self.state()?.suppliers.get(&id).cloned())
    }

    async fn get_product(&mut self, id: i64) -> DbResult<Option<ProductRow>> {
        Ok(self.state()?.products.get(&id).cloned())
    }

    async fn find_product_by_name(&mut self, name: &str) -> DbResult<Option<ProductRow>> {
        Ok(self
            .state()?
            .products
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn insert_product(&mut self, product: &NewProduct) -> DbResult<i64> {
        let s = self.state()?;
        if s.products.values().any(|p| p.name == product.name) {
            return Err(unique("uk_products_name"));
        }
        let id = s.id();
        s.products.insert(
            id,
            ProductRow {
                id,
                name: product.name.clone(),
                base_unit: product.base_unit.clone(),
                supplier_id: product.supplier_id,
                unit_price: product.unit_price,
                status: product.status.clone(),
            },
        );
        Ok(id)
    }

    async fn get_purchase_param(&mut self, product_id: i64) -> DbResult<Option<PurchaseParamRow>> {
        Ok(self
            .state()?
            .purchase_params
            .iter()
            .find(|p| p.product_id == product_id)
            .cloned())
    }

    async fn get_unit_spec(&mut self, product_id: i64, unit: &str) -> DbResult<Option<UnitSpecRow>> {
        Ok(self
            .state()?
            .unit_specs
            .iter()
            .find(|u| u.product_id == product_id && u.unit == unit)
            .cloned())
    }

    async fn latest_supplier_price(
        &mut self,
        supplier_id: i64,
        product_id: i64,
        on: NaiveDate,
    ) -> DbResult<Option<f64>> {
        Ok(self
            .state()?
            .supplier_prices
            .iter()
            .filter(|p| {
                p.supplier_id == supplier_id && p.product_id == product_id && p.effective_from <= on
            })
            .max_by_key(|p| p.effective_from)
            .map(|p| p.price))
    }

    async fn insert_purchase(&mut self, p: &NewPurchase) -> DbResult<i64> {
        let s = self.state()?;
        let id = s.id();
        s.purchases.insert(
            id,
            PurchaseRow {
                id,
                supplier_id: p.supplier_id,
                base_id: p.base_id,
                purchase_date: p.purchase_date,
                total_amount: p.total_amount,
                currency: p.currency.clone(),
                order_number: p.order_number.clone(),
                receiver: p.receiver.clone(),
                created_at: now(),
            },
        );
        Ok(id)
    }

    async fn get_purchase(&mut self, id: i64, _for_update: bool) -> DbResult<Option<PurchaseRow>> {
        Ok(self.state()?.purchases.get(&id).cloned())
    }

    async fn update_purchase(&mut self, id: i64, p: &NewPurchase) -> DbResult<()> {
        let row = self
            .state()?
            .purchases
            .get_mut(&id)
            .ok_or(DbError::NotFound)?;
        row.supplier_id = p.supplier_id;
        row.base_id = p.base_id;
        row.purchase_date = p.purchase_date;
        row.total_amount = p.total_amount;
        row.currency = p.currency.clone();
        row.order_number = p.order_number.clone();
        row.receiver = p.receiver.clone();
        Ok(())
    }

    async fn delete_purchase(&mut self, id: i64) -> DbResult<()> {
        self.state()?.purchases.remove(&id);
        Ok(())
    }

    async fn insert_purchase_items(
        &mut self,
        purchase_id: i64,
        items: &[NewPurchaseItem],
    ) -> DbResult<()> {
        let s = self.state()?;
        for it in items {
            let id = s.id();
            s.items.insert(
                id,
                PurchaseItemRow {
                    id,
                    purchase_entry_id: purchase_id,
                    product_id: it.product_id,
                    product_name: it.product_name.clone(),
                    unit: it.unit.clone(),
                    quantity: it.quantity,
                    unit_price: it.unit_price,
                    amount: it.amount,
                    quantity_base: it.quantity_base,
                },
            );
        }
        Ok(())
    }

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> DbResult<()> {
        self.state()?
            .items
            .retain(|_, it| it.purchase_entry_id != purchase_id);
        Ok(())
    }

    async fn list_purchase_items(&mut self, purchase_id: i64) -> DbResult<Vec<PurchaseItemRow>> {
        Ok(self
            .state()?
            .items
            .values()
            .filter(|it| it.purchase_entry_id == purchase_id)
            .cloned()
            .collect())
    }

    async fn lock_bucket(&mut self, _supplier_id: i64, _base_id: i64) -> DbResult<()> {
        // 整个事务已持有状态锁 / the whole transaction already holds the state lock
        self.state().map(|_| ())
    }

    async fn find_open_payable(&mut self, bucket: &PayableBucket) -> DbResult<Option<PayableRow>> {
        Ok(self
            .state()?
            .payables
            .values()
            .find(|p| {
                p.supplier_id == Some(bucket.supplier_id)
                    && p.base_id == bucket.base_id
                    && p.settlement_type == bucket.settlement_type
                    && p.period_month == bucket.period_month
                    && p.period_half == bucket.period_half
                    && p.status != "paid"
                    && p.purchase_entry_id.is_none()
            })
            .cloned())
    }

    async fn insert_payable(&mut self, p: &NewPayable) -> DbResult<i64> {
        let s = self.state()?;
        let id = s.id();
        s.payables.insert(
            id,
            PayableRow {
                id,
                supplier_id: p.supplier_id,
                base_id: p.base_id,
                purchase_entry_id: p.purchase_entry_id,
                settlement_type: p.settlement_type.clone(),
                period_month: p.period_month.clone(),
                period_half: p.period_half.clone(),
                total_amount: p.total_amount,
                paid_amount: p.paid_amount,
                remaining_amount: p.remaining_amount,
                currency: p.currency.clone(),
                status: p.status.clone(),
                due_date: p.due_date,
                created_at: now(),
            },
        );
        Ok(id)
    }

    async fn get_payable(&mut self, id: i64, _for_update: bool) -> DbResult<Option<PayableRow>> {
        Ok(self.state()?.payables.get(&id).cloned())
    }

    async fn find_payable_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<PayableRow>> {
        Ok(self
            .state()?
            .payables
            .values()
            .find(|p| p.purchase_entry_id == Some(purchase_id))
            .cloned())
    }

    async fn update_payable_totals(
        &mut self,
        id: i64,
        totals: &PayableTotals,
        status: &str,
    ) -> DbResult<()> {
        let p = self
            .state()?
            .payables
            .get_mut(&id)
            .ok_or(DbError::NotFound)?;
        p.total_amount = totals.total_amount;
        p.paid_amount = totals.paid_amount;
        p.remaining_amount = totals.remaining_amount;
        p.status = status.to_string();
        Ok(())
    }

    async fn update_payable_due_date(
        &mut self,
        id: i64,
        due_date: Option<NaiveDateTime>,
    ) -> DbResult<()> {
        let p = self
            .state()?
            .payables
            .get_mut(&id)
            .ok_or(DbError::NotFound)?;
        p.due_date = due_date;
        Ok(())
    }

    async fn delete_payable(&mut self, id: i64) -> DbResult<()> {
        self.state()?.payables.remove(&id);
        Ok(())
    }

    async fn get_payable_view(&mut self, id: i64) -> DbResult<Option<PayableView>> {
        let s = self.state()?;
        Ok(s.payables.get(&id).and_then(|p| s.view(p)))
    }

    async fn list_payables(&mut self, filter: &PayableFilter) -> DbResult<(Vec<PayableView>, u64)> {
        let s = self.state()?;
        let mut rows: Vec<PayableView> = s
            .payables
            .values()
            .filter_map(|p| s.view(p))
            .filter(|v| s.matches(v, filter))
            .collect();
        rows.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.record.id.cmp(&a.record.id))
        });
        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_link(&mut self, link: &NewLink) -> DbResult<i64> {
        let s = self.state()?;
        if s
            .links
            .values()
            .any(|l| l.purchase_entry_id == link.purchase_entry_id)
        {
            return Err(unique("uk_link_purchase"));
        }
        let id = s.id();
        s.links.insert(
            id,
            LinkRow {
                id,
                payable_record_id: link.payable_record_id,
                purchase_entry_id: link.purchase_entry_id,
                amount: link.amount,
                currency: link.currency.clone(),
            },
        );
        Ok(id)
    }

    async fn find_link_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<LinkRow>> {
        Ok(self
            .state()?
            .links
            .values()
            .find(|l| l.purchase_entry_id == purchase_id)
            .cloned())
    }

    async fn list_links(&mut self, payable_id: i64) -> DbResult<Vec<LinkRow>> {
        Ok(self
            .state()?
            .links
            .values()
            .filter(|l| l.payable_record_id == payable_id)
            .cloned()
            .collect())
    }

    async fn sum_links(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        let s = self.state()?;
        let (sum, count) = s
            .links
            .values()
            .filter(|l| l.payable_record_id == payable_id)
            .fold((0.0, 0), |(sum, n), l| (sum + l.amount, n + 1));
        Ok((round2(sum), count))
    }

    async fn update_link_amount(
        &mut self,
        link_id: i64,
        amount: f64,
        currency: &str,
    ) -> DbResult<()> {
        let l = self
            .state()?
            .links
            .get_mut(&link_id)
            .ok_or(DbError::NotFound)?;
        l.amount = amount;
        l.currency = currency.to_string();
        Ok(())
    }

    async fn delete_link(&mut self, link_id: i64) -> DbResult<()> {
        self.state()?.links.remove(&link_id);
        Ok(())
    }

    async fn insert_payment(&mut self, p: &NewPayment) -> DbResult<i64> {
        let s = self.state()?;
        let id = s.id();
        s.payments.insert(
            id,
            PaymentRow {
                id,
                payable_record_id: p.payable_record_id,
                payment_amount: p.payment_amount,
                payment_date: p.payment_date,
                payment_method: p.payment_method.clone(),
                reference_number: p.reference_number.clone(),
                notes: p.notes.clone(),
                currency: p.currency.clone(),
                created_at: now(),
            },
        );
        Ok(id)
    }

    async fn get_payment(&mut self, id: i64) -> DbResult<Option<PaymentRow>> {
        Ok(self.state()?.payments.get(&id).cloned())
    }

    async fn delete_payment(&mut self, id: i64) -> DbResult<()> {
        self.state()?.payments.remove(&id);
        Ok(())
    }

    async fn delete_payments_for_payable(&mut self, payable_id: i64) -> DbResult<u64> {
        let s = self.state()?;
        let before = s.payments.len();
        s.payments.retain(|_, p| p.payable_record_id != payable_id);
        Ok((before - s.payments.len()) as u64)
    }

    async fn list_payments(&mut self, payable_id: i64) -> DbResult<Vec<PaymentRow>> {
        let mut rows: Vec<PaymentRow> = self
            .state()?
            .payments
            .values()
            .filter(|p| p.payable_record_id == payable_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.payment_date.cmp(&b.payment_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn sum_payments(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        let s = self.state()?;
        let (sum, count) = s
            .payments
            .values()
            .filter(|p| p.payable_record_id == payable_id)
            .fold((0.0, 0), |(sum, n), p| (sum + p.payment_amount, n + 1));
        Ok((round2(sum), count))
    }

    async fn find_idempotency(&mut self, resource: &str, key: &str) -> DbResult<Option<i64>> {
        Ok(self
            .state()?
            .idempotency
            .get(key)
            .filter(|e| e.resource == resource)
            .map(|e| e.ref_id))
    }

    async fn insert_idempotency(&mut self, resource: &str, key: &str, ref_id: i64) -> DbResult<()> {
        let s = self.state()?;
        if s.idempotency.contains_key(key) {
            return Err(unique("uk_idempotency_key"));
        }
        s.idempotency.insert(
            key.to_string(),
            IdempotencyEntry {
                resource: resource.to_string(),
                ref_id,
            },
        );
        Ok(())
    }

    async fn rebuild_monthly_rollup(
        &mut self,
        month: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<RollupCounts> {
        let s = self.state()?;
        let in_month = |d: NaiveDate| d >= start && d < end;

        // (supplier, base) -> (purchases, count, paid)
        let mut spend: BTreeMap<(i64, i64), (f64, i64, f64)> = BTreeMap::new();
        for p in s.purchases.values().filter(|p| in_month(p.purchase_date)) {
            let e = spend.entry((p.supplier_id, p.base_id)).or_default();
            e.0 += p.total_amount;
            e.1 += 1;
        }
        for pm in s.payments.values().filter(|pm| in_month(pm.created_at.date())) {
            let Some(payable) = s.payables.get(&pm.payable_record_id) else {
                continue;
            };
            let Some(supplier_id) = payable.supplier_id else {
                continue;
            };
            spend.entry((supplier_id, payable.base_id)).or_default().2 += pm.payment_amount;
        }

        let mut expense: BTreeMap<i64, f64> = BTreeMap::new();
        for e in s.expenses.iter().filter(|e| in_month(e.expense_date)) {
            *expense.entry(e.base_id).or_default() += e.amount;
        }

        s.mv_supplier_spend.retain(|r| r.month != month);
        s.mv_base_expense.retain(|r| r.month != month);
        let counts = RollupCounts {
            supplier_rows: spend.len() as u64,
            expense_rows: expense.len() as u64,
        };
        for ((supplier_id, base_id), (total, count, paid)) in spend {
            s.mv_supplier_spend.push(SupplierMonthlySpendRow {
                supplier_id,
                base_id,
                month: month.to_string(),
                total_purchase: round2(total),
                purchase_count: count,
                total_paid: round2(paid),
                remaining: round2((total - paid).max(0.0)),
            });
        }
        for (base_id, total) in expense {
            s.mv_base_expense.push(BaseExpenseMonthRow {
                base_id,
                month: month.to_string(),
                total_amount: round2(total),
            });
        }
        Ok(counts)
    }

    async fn find_user(&mut self, username: &str) -> DbResult<Option<UserRow>> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(&mut self, user: &NewUser) -> DbResult<i64> {
        let s = self.state()?;
        if s.users.values().any(|u| u.username == user.username) {
            return Err(unique("uk_users_username"));
        }
        let id = s.id();
        s.users.insert(
            id,
            UserRow {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                role: user.role.clone(),
                bases: user.bases.clone(),
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        let base = store.add_base("Vientiane", "VTE", "CNY").await;
        let supplier = store.add_supplier("Fresh Co", Some("monthly"), Some(25)).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_purchase(&NewPurchase {
                supplier_id: supplier,
                base_id: base,
                purchase_date: d(2025, 3, 5),
                total_amount: 10.0,
                currency: "CNY".into(),
                order_number: String::new(),
                receiver: String::new(),
            })
            .await
            .unwrap();
            // 不提交直接丢弃 / dropped without commit
        }
        assert!(store.purchases().await.is_empty());
    }

    #[tokio::test]
    async fn test_link_unique_on_purchase() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let link = NewLink {
            payable_record_id: 1,
            purchase_entry_id: 7,
            amount: 5.0,
            currency: "CNY".into(),
        };
        tx.insert_link(&link).await.unwrap();
        let err = tx
            .insert_link(&NewLink {
                payable_record_id: 2,
                ..link
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_idempotency_key_unique() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_idempotency("payment", "K", 3).await.unwrap();
        assert_eq!(tx.find_idempotency("payment", "K").await.unwrap(), Some(3));
        assert_eq!(tx.find_idempotency("purchase", "K").await.unwrap(), None);
        assert!(tx
            .insert_idempotency("payment", "K", 4)
            .await
            .unwrap_err()
            .is_unique_violation());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_latest_effective_supplier_price() {
        let store = MemoryStore::new();
        store.add_supplier_price(1, 2, 3.0, d(2025, 1, 1)).await;
        store.add_supplier_price(1, 2, 4.5, d(2025, 3, 1)).await;
        store.add_supplier_price(1, 2, 9.9, d(2025, 6, 1)).await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.latest_supplier_price(1, 2, d(2025, 4, 2)).await.unwrap(),
            Some(4.5)
        );
        assert_eq!(tx.latest_supplier_price(1, 2, d(2024, 12, 31)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_payables_filters_by_scope_and_supplier() {
        let store = MemoryStore::new();
        let b1 = store.add_base("Vientiane", "VTE", "CNY").await;
        let b2 = store.add_base("Luang", "LPQ", "CNY").await;
        let s1 = store.add_supplier("Fresh Co", Some("monthly"), None).await;
        let mut tx = store.begin().await.unwrap();
        for base in [b1, b2] {
            tx.insert_payable(&NewPayable {
                supplier_id: Some(s1),
                base_id: base,
                purchase_entry_id: None,
                settlement_type: "monthly".into(),
                period_month: "2025-03".into(),
                period_half: String::new(),
                total_amount: 1.0,
                paid_amount: 0.0,
                remaining_amount: 1.0,
                currency: "CNY".into(),
                status: "pending".into(),
                due_date: None,
            })
            .await
            .unwrap();
        }
        let (rows, total) = tx
            .list_payables(&PayableFilter {
                supplier_name: Some("Fresh".into()),
                base_ids: Some(vec![b2]),
                limit: 20,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].base_name, "Luang");
        assert_eq!(rows[0].supplier_name.as_deref(), Some("Fresh Co"));
    }
}
