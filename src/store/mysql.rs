//! MySQL 实现（sqlx）
//! MySQL-backed store. Locks are InnoDB `SELECT ... FOR UPDATE`; the bucket lock
//! relies on `idx_payable_bucket` so the next-key lock also covers the insert gap.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::MySqlConnection;
use sqlx::{MySql, Pool, QueryBuilder, Transaction};
use tracing::{debug, info};
use v::db::error::{DbError, Result as DbResult};
use v::HealthCheck;

use super::model::*;
use super::schema::SCHEMA;
use super::{Store, StoreTx};

const PAYABLE_COLUMNS: &str = "p.id, p.supplier_id, p.base_id, p.purchase_entry_id, p.settlement_type, \
     p.period_month, p.period_half, p.total_amount, p.paid_amount, p.remaining_amount, \
     p.currency, p.status, p.due_date, p.created_at";

#[derive(Clone)]
pub struct MySqlStore {
    pool: Pool<MySql>,
}

impl MySqlStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn begin(&self) -> DbResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx: Some(tx) }))
    }

    async fn migrate(&self) -> DbResult<()> {
        for (table, ddl) in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
            debug!(table = %table, "schema ensured");
        }
        info!(tables = SCHEMA.len(), "MySQL 表结构已就绪 / schema ready");
        Ok(())
    }

    async fn ping(&self) -> DbResult<()> {
        let status = self.pool.check_health().await;
        if status.healthy {
            Ok(())
        } else {
            Err(DbError::Pool(status.message.unwrap_or_default()))
        }
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}

pub struct MySqlTx {
    tx: Option<Transaction<'static, MySql>>,
}

impl MySqlTx {
    fn conn(&mut self) -> DbResult<&mut MySqlConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| DbError::Tx("事务已结束 / transaction already finished".to_string()))
    }
}

fn push_payable_filter<'a>(qb: &mut QueryBuilder<'a, MySql>, filter: &'a PayableFilter) {
    if let Some(name) = filter.supplier_name.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND s.name LIKE ").push_bind(format!("%{}%", name));
    }
    if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND p.status = ").push_bind(status);
    }
    if let Some(base) = filter.base_name.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND b.name = ").push_bind(base);
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND p.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND p.created_at <= ").push_bind(to);
    }
    if let Some(ids) = &filter.base_ids {
        if ids.is_empty() {
            qb.push(" AND 1 = 0");
        } else {
            qb.push(" AND p.base_id IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }
    }
}

#[async_trait]
impl StoreTx for MySqlTx {
    async fn commit(&mut self) -> DbResult<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(DbError::from),
            None => Err(DbError::Tx("事务已结束 / transaction already finished".to_string())),
        }
    }

    async fn rollback(&mut self) -> DbResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(DbError::from),
            None => Ok(()),
        }
    }

    async fn get_base(&mut self, id: i64) -> DbResult<Option<BaseRow>> {
        let row = sqlx::query_as::<_, BaseRow>(
            "SELECT id, name, code, currency FROM bases WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn base_ids_by_names(&mut self, names: &[String]) -> DbResult<Vec<i64>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<MySql>::new("SELECT id FROM bases WHERE name IN (");
        let mut sep = qb.separated(", ");
        for n in names {
            sep.push_bind(n);
        }
        sep.push_unseparated(") ORDER BY id");
        let ids: Vec<(i64,)> = qb.build_query_as().fetch_all(self.conn()?).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn get_supplier(&mut self, id: i64) -> DbResult<Option<SupplierRow>> {
        let row = sqlx::query_as::<_, SupplierRow>(
            "SELECT id, name, settlement_type, settlement_day FROM suppliers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn get_product(&mut self, id: i64) -> DbResult<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, base_unit, supplier_id, unit_price, status FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn find_product_by_name(&mut self, name: &str) -> DbResult<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, base_unit, supplier_id, unit_price, status FROM products WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn insert_product(&mut self, product: &NewProduct) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO products (name, base_unit, supplier_id, unit_price, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(&product.base_unit)
        .bind(product.supplier_id)
        .bind(product.unit_price)
        .bind(&product.status)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }

    async fn get_purchase_param(&mut self, product_id: i64) -> DbResult<Option<PurchaseParamRow>> {
        let row = sqlx::query_as::<_, PurchaseParamRow>(
            "SELECT product_id, unit, factor_to_base, purchase_price FROM product_purchase_params WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn get_unit_spec(&mut self, product_id: i64, unit: &str) -> DbResult<Option<UnitSpecRow>> {
        let row = sqlx::query_as::<_, UnitSpecRow>(
            "SELECT product_id, unit, factor_to_base, kind, is_default FROM product_unit_specs \
             WHERE product_id = ? AND unit = ?",
        )
        .bind(product_id)
        .bind(unit)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn latest_supplier_price(
        &mut self,
        supplier_id: i64,
        product_id: i64,
        on: NaiveDate,
    ) -> DbResult<Option<f64>> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT price FROM supplier_product_prices \
             WHERE supplier_id = ? AND product_id = ? AND effective_from <= ? \
             ORDER BY effective_from DESC LIMIT 1",
        )
        .bind(supplier_id)
        .bind(product_id)
        .bind(on)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row.map(|(p,)| p))
    }

    async fn insert_purchase(&mut self, p: &NewPurchase) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO purchase_entries \
             (supplier_id, base_id, purchase_date, total_amount, currency, order_number, receiver) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(p.supplier_id)
        .bind(p.base_id)
        .bind(p.purchase_date)
        .bind(p.total_amount)
        .bind(&p.currency)
        .bind(&p.order_number)
        .bind(&p.receiver)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }

    async fn get_purchase(&mut self, id: i64, for_update: bool) -> DbResult<Option<PurchaseRow>> {
        let sql = if for_update {
            "SELECT id, supplier_id, base_id, purchase_date, total_amount, currency, order_number, receiver, created_at \
             FROM purchase_entries WHERE id = ? FOR UPDATE"
        } else {
            "SELECT id, supplier_id, base_id, purchase_date, total_amount, currency, order_number, receiver, created_at \
             FROM purchase_entries WHERE id = ?"
        };
        let row = sqlx::query_as::<_, PurchaseRow>(sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn update_purchase(&mut self, id: i64, p: &NewPurchase) -> DbResult<()> {
        sqlx::query(
            "UPDATE purchase_entries SET supplier_id = ?, base_id = ?, purchase_date = ?, total_amount = ?, \
             currency = ?, order_number = ?, receiver = ? WHERE id = ?",
        )
        .bind(p.supplier_id)
        .bind(p.base_id)
        .bind(p.purchase_date)
        .bind(p.total_amount)
        .bind(&p.currency)
        .bind(&p.order_number)
        .bind(&p.receiver)
        .bind(id)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn delete_purchase(&mut self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM purchase_entries WHERE id = ?")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn insert_purchase_items(
        &mut self,
        purchase_id: i64,
        items: &[NewPurchaseItem],
    ) -> DbResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<MySql>::new(
            "INSERT INTO purchase_entry_items \
             (purchase_entry_id, product_id, product_name, unit, quantity, unit_price, amount, quantity_base) ",
        );
        qb.push_values(items, |mut b, it| {
            b.push_bind(purchase_id)
                .push_bind(it.product_id)
                .push_bind(&it.product_name)
                .push_bind(&it.unit)
                .push_bind(it.quantity)
                .push_bind(it.unit_price)
                .push_bind(it.amount)
                .push_bind(it.quantity_base);
        });
        qb.build().execute(self.conn()?).await?;
        Ok(())
    }

    async fn delete_purchase_items(&mut self, purchase_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM purchase_entry_items WHERE purchase_entry_id = ?")
            .bind(purchase_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn list_purchase_items(&mut self, purchase_id: i64) -> DbResult<Vec<PurchaseItemRow>> {
        let rows = sqlx::query_as::<_, PurchaseItemRow>(
            "SELECT id, purchase_entry_id, product_id, product_name, unit, quantity, unit_price, amount, quantity_base \
             FROM purchase_entry_items WHERE purchase_entry_id = ? ORDER BY id",
        )
        .bind(purchase_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }

    async fn lock_bucket(&mut self, supplier_id: i64, base_id: i64) -> DbResult<()> {
        // 空范围上的 FOR UPDATE 只有可共享的间隙锁，先锁供应商行使同桶首笔采购串行化
        // An empty range only yields shareable gap locks; the supplier row lock serialises
        // first purchases into a bucket.
        sqlx::query("SELECT id FROM suppliers WHERE id = ? FOR UPDATE")
            .bind(supplier_id)
            .fetch_optional(self.conn()?)
            .await?;
        let locked: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM payable_records WHERE supplier_id = ? AND base_id = ? FOR UPDATE",
        )
        .bind(supplier_id)
        .bind(base_id)
        .fetch_all(self.conn()?)
        .await?;
        debug!(supplier_id, base_id, rows = locked.len(), "bucket locked");
        Ok(())
    }

    async fn find_open_payable(&mut self, bucket: &PayableBucket) -> DbResult<Option<PayableRow>> {
        let sql = format!(
            "SELECT {} FROM payable_records p \
             WHERE p.supplier_id = ? AND p.base_id = ? AND p.settlement_type = ? \
             AND p.period_month = ? AND p.period_half = ? AND p.status <> 'paid' \
             AND p.purchase_entry_id IS NULL ORDER BY p.id LIMIT 1",
            PAYABLE_COLUMNS
        );
        let row = sqlx::query_as::<_, PayableRow>(&sql)
            .bind(bucket.supplier_id)
            .bind(bucket.base_id)
            .bind(&bucket.settlement_type)
            .bind(&bucket.period_month)
            .bind(&bucket.period_half)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn insert_payable(&mut self, p: &NewPayable) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO payable_records \
             (supplier_id, base_id, purchase_entry_id, settlement_type, period_month, period_half, \
              total_amount, paid_amount, remaining_amount, currency, status, due_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(p.supplier_id)
        .bind(p.base_id)
        .bind(p.purchase_entry_id)
        .bind(&p.settlement_type)
        .bind(&p.period_month)
        .bind(&p.period_half)
        .bind(p.total_amount)
        .bind(p.paid_amount)
        .bind(p.remaining_amount)
        .bind(&p.currency)
        .bind(&p.status)
        .bind(p.due_date)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }

    async fn get_payable(&mut self, id: i64, for_update: bool) -> DbResult<Option<PayableRow>> {
        let sql = format!(
            "SELECT {} FROM payable_records p WHERE p.id = ?{}",
            PAYABLE_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query_as::<_, PayableRow>(&sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn find_payable_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<PayableRow>> {
        let sql = format!(
            "SELECT {} FROM payable_records p WHERE p.purchase_entry_id = ? LIMIT 1 FOR UPDATE",
            PAYABLE_COLUMNS
        );
        let row = sqlx::query_as::<_, PayableRow>(&sql)
            .bind(purchase_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn update_payable_totals(
        &mut self,
        id: i64,
        totals: &PayableTotals,
        status: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE payable_records SET total_amount = ?, paid_amount = ?, remaining_amount = ?, status = ? \
             WHERE id = ?",
        )
        .bind(totals.total_amount)
        .bind(totals.paid_amount)
        .bind(totals.remaining_amount)
        .bind(status)
        .bind(id)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_payable_due_date(
        &mut self,
        id: i64,
        due_date: Option<NaiveDateTime>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE payable_records SET due_date = ? WHERE id = ?")
            .bind(due_date)
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete_payable(&mut self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM payable_records WHERE id = ?")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn get_payable_view(&mut self, id: i64) -> DbResult<Option<PayableView>> {
        let sql = format!(
            "SELECT {}, s.name AS supplier_name, b.name AS base_name FROM payable_records p \
             JOIN bases b ON b.id = p.base_id LEFT JOIN suppliers s ON s.id = p.supplier_id \
             WHERE p.id = ?",
            PAYABLE_COLUMNS
        );
        let row = sqlx::query_as::<_, PayableView>(&sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row)
    }

    async fn list_payables(&mut self, filter: &PayableFilter) -> DbResult<(Vec<PayableView>, u64)> {
        const FROM: &str = " FROM payable_records p JOIN bases b ON b.id = p.base_id \
                            LEFT JOIN suppliers s ON s.id = p.supplier_id WHERE 1 = 1";

        let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*)");
        count_qb.push(FROM);
        push_payable_filter(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(self.conn()?).await?;

        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {}, s.name AS supplier_name, b.name AS base_name",
            PAYABLE_COLUMNS
        ));
        qb.push(FROM);
        push_payable_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let rows: Vec<PayableView> = qb.build_query_as().fetch_all(self.conn()?).await?;
        Ok((rows, total.max(0) as u64))
    }

    async fn insert_link(&mut self, link: &NewLink) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO payable_links (payable_record_id, purchase_entry_id, amount, currency) VALUES (?, ?, ?, ?)",
        )
        .bind(link.payable_record_id)
        .bind(link.purchase_entry_id)
        .bind(link.amount)
        .bind(&link.currency)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }

    async fn find_link_by_purchase(&mut self, purchase_id: i64) -> DbResult<Option<LinkRow>> {
        let row = sqlx::query_as::<_, LinkRow>(
            "SELECT id, payable_record_id, purchase_entry_id, amount, currency FROM payable_links \
             WHERE purchase_entry_id = ? FOR UPDATE",
        )
        .bind(purchase_id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn list_links(&mut self, payable_id: i64) -> DbResult<Vec<LinkRow>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            "SELECT id, payable_record_id, purchase_entry_id, amount, currency FROM payable_links \
             WHERE payable_record_id = ? ORDER BY id",
        )
        .bind(payable_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }

    async fn sum_links(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        let row: (Option<f64>, i64) = sqlx::query_as(
            "SELECT SUM(amount), COUNT(*) FROM payable_links WHERE payable_record_id = ?",
        )
        .bind(payable_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok((row.0.unwrap_or(0.0), row.1))
    }

    async fn update_link_amount(
        &mut self,
        link_id: i64,
        amount: f64,
        currency: &str,
    ) -> DbResult<()> {
        sqlx::query("UPDATE payable_links SET amount = ?, currency = ? WHERE id = ?")
            .bind(amount)
            .bind(currency)
            .bind(link_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete_link(&mut self, link_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM payable_links WHERE id = ?")
            .bind(link_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn insert_payment(&mut self, p: &NewPayment) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO payment_records \
             (payable_record_id, payment_amount, payment_date, payment_method, reference_number, notes, currency) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(p.payable_record_id)
        .bind(p.payment_amount)
        .bind(p.payment_date)
        .bind(&p.payment_method)
        .bind(&p.reference_number)
        .bind(&p.notes)
        .bind(&p.currency)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }

    async fn get_payment(&mut self, id: i64) -> DbResult<Option<PaymentRow>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, payable_record_id, payment_amount, payment_date, payment_method, reference_number, \
             notes, currency, created_at FROM payment_records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn delete_payment(&mut self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM payment_records WHERE id = ?")
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete_payments_for_payable(&mut self, payable_id: i64) -> DbResult<u64> {
        let res = sqlx::query("DELETE FROM payment_records WHERE payable_record_id = ?")
            .bind(payable_id)
            .execute(self.conn()?)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_payments(&mut self, payable_id: i64) -> DbResult<Vec<PaymentRow>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, payable_record_id, payment_amount, payment_date, payment_method, reference_number, \
             notes, currency, created_at FROM payment_records WHERE payable_record_id = ? \
             ORDER BY payment_date, id",
        )
        .bind(payable_id)
        .fetch_all(self.conn()?)
        .await?;
        Ok(rows)
    }

    async fn sum_payments(&mut self, payable_id: i64) -> DbResult<(f64, i64)> {
        let row: (Option<f64>, i64) = sqlx::query_as(
            "SELECT SUM(payment_amount), COUNT(*) FROM payment_records WHERE payable_record_id = ?",
        )
        .bind(payable_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok((row.0.unwrap_or(0.0), row.1))
    }

    async fn find_idempotency(&mut self, resource: &str, key: &str) -> DbResult<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT ref_id FROM idempotency_keys WHERE resource = ? AND idem_key = ?",
        )
        .bind(resource)
        .bind(key)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert_idempotency(&mut self, resource: &str, key: &str, ref_id: i64) -> DbResult<()> {
        sqlx::query("INSERT INTO idempotency_keys (idem_key, resource, ref_id) VALUES (?, ?, ?)")
            .bind(key)
            .bind(resource)
            .bind(ref_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn rebuild_monthly_rollup(
        &mut self,
        month: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<RollupCounts> {
        let conn = self.conn()?;
        sqlx::query("DELETE FROM mv_supplier_monthly_spend WHERE month = ?")
            .bind(month)
            .execute(&mut *conn)
            .await?;
        let spend = sqlx::query(
            "INSERT INTO mv_supplier_monthly_spend \
             (supplier_id, base_id, month, total_purchase, purchase_count, total_paid, remaining) \
             SELECT k.supplier_id, k.base_id, ?, COALESCE(pu.total, 0), COALESCE(pu.cnt, 0), \
                    COALESCE(pa.paid, 0), GREATEST(COALESCE(pu.total, 0) - COALESCE(pa.paid, 0), 0) \
             FROM ( \
                 SELECT supplier_id, base_id FROM purchase_entries \
                  WHERE purchase_date >= ? AND purchase_date < ? \
                 UNION \
                 SELECT pr.supplier_id, pr.base_id FROM payment_records pm \
                   JOIN payable_records pr ON pr.id = pm.payable_record_id \
                  WHERE pm.created_at >= ? AND pm.created_at < ? AND pr.supplier_id IS NOT NULL \
             ) k \
             LEFT JOIN ( \
                 SELECT supplier_id, base_id, SUM(total_amount) AS total, COUNT(*) AS cnt \
                   FROM purchase_entries WHERE purchase_date >= ? AND purchase_date < ? \
                  GROUP BY supplier_id, base_id \
             ) pu ON pu.supplier_id = k.supplier_id AND pu.base_id = k.base_id \
             LEFT JOIN ( \
                 SELECT pr.supplier_id, pr.base_id, SUM(pm.payment_amount) AS paid \
                   FROM payment_records pm JOIN payable_records pr ON pr.id = pm.payable_record_id \
                  WHERE pm.created_at >= ? AND pm.created_at < ? \
                  GROUP BY pr.supplier_id, pr.base_id \
             ) pa ON pa.supplier_id = k.supplier_id AND pa.base_id = k.base_id",
        )
        .bind(month)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM mv_base_expense_month WHERE month = ?")
            .bind(month)
            .execute(&mut *conn)
            .await?;
        let expense = sqlx::query(
            "INSERT INTO mv_base_expense_month (base_id, month, total_amount) \
             SELECT base_id, ?, SUM(amount) FROM base_expenses \
              WHERE expense_date >= ? AND expense_date < ? GROUP BY base_id",
        )
        .bind(month)
        .bind(start)
        .bind(end)
        .execute(&mut *conn)
        .await?;

        Ok(RollupCounts {
            supplier_rows: spend.rows_affected(),
            expense_rows: expense.rows_affected(),
        })
    }

    async fn find_user(&mut self, username: &str) -> DbResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, role, bases FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(row)
    }

    async fn insert_user(&mut self, user: &NewUser) -> DbResult<i64> {
        let res = sqlx::query(
            "INSERT INTO users (username, password_hash, role, bases) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.bases)
        .execute(self.conn()?)
        .await?;
        Ok(res.last_insert_id() as i64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use v::{connect_mysql, PoolSettings};

    use super::*;
    use crate::modules::base::scope::AccessScope;
    use crate::modules::purchase::resolver::LineInput;
    use crate::modules::purchase::service::{create_purchase, PurchaseInput};
    use crate::modules::tx::LedgerSettings;

    /// 需要真实 MySQL：设置 TEST_DATABASE_URL，否则跳过
    async fn test_store() -> Option<MySqlStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = connect_mysql(&PoolSettings::new(url)).await.unwrap();
        let store = MySqlStore::new(pool);
        store.migrate().await.unwrap();
        Some(store)
    }

    async fn seed(store: &MySqlStore, tag: &str) -> (i64, i64) {
        let base = sqlx::query("INSERT INTO bases (name, code, currency) VALUES (?, ?, 'CNY')")
            .bind(format!("base-{}", tag))
            .bind(format!("B{}", tag))
            .execute(store.pool())
            .await
            .unwrap()
            .last_insert_id() as i64;
        let supplier = sqlx::query(
            "INSERT INTO suppliers (name, settlement_type, settlement_day) VALUES (?, 'monthly', 25)",
        )
        .bind(format!("supplier-{}", tag))
        .execute(store.pool())
        .await
        .unwrap()
        .last_insert_id() as i64;
        (base, supplier)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_purchases_share_one_payable() {
        let Some(store) = test_store().await else {
            return;
        };
        let tag = chrono::Local::now().format("%H%M%S%f").to_string();
        let (base, supplier) = seed(&store, &tag).await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for day in 1..=4u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let input = PurchaseInput {
                    supplier_id: supplier,
                    base_id: base,
                    purchase_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    total_amount: 10.0,
                    currency: None,
                    order_number: String::new(),
                    receiver: String::new(),
                    items: vec![LineInput {
                        product_name: format!("item-{}", day),
                        unit: "kg".to_string(),
                        quantity: 1.0,
                        unit_price: 10.0,
                        ..Default::default()
                    }],
                };
                create_purchase(store.as_ref(), &LedgerSettings::default(), &AccessScope::All, &input, None)
                    .await
                    .map(|out| out.payable_id)
            }));
        }
        let mut payable_ids = Vec::new();
        for h in handles {
            payable_ids.push(h.await.unwrap().unwrap());
        }
        payable_ids.dedup();
        assert_eq!(payable_ids.len(), 1);

        let (open, total): (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), SUM(total_amount) FROM payable_records \
             WHERE supplier_id = ? AND base_id = ? AND status <> 'paid'",
        )
        .bind(supplier)
        .bind(base)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(open, 1);
        assert_eq!(total, 40.0);
    }
}
