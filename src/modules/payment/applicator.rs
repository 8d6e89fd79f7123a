//! 付款登记：锁应付行 -> 写付款 -> 全量重算已付/剩余/状态
//! Payment applicator. Paid amounts are always re-summed, never incremented.

use chrono::NaiveDate;
use tracing::info;

use crate::comm::serde_fmt::round2;
use crate::modules::base::scope::AccessScope;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::modules::payable::aggregator::recompute_payable;
use crate::modules::payable::amounts::EPSILON;
use crate::modules::tx::{finish, with_timeout, LedgerSettings};
use crate::store::{NewPayment, PayableRow, PaymentRow, Store, StoreTx};

pub const PAYMENT_RESOURCE: &str = "payment";

#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub payable_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub payment_method: String,
    pub reference: String,
    pub notes: String,
}

async fn replay_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    key: &str,
) -> ServiceResult<Option<PaymentRow>> {
    let Some(payment_id) = tx.find_idempotency(PAYMENT_RESOURCE, key).await? else {
        return Ok(None);
    };
    let payment = tx
        .get_payment(payment_id)
        .await?
        .ok_or(ServiceError::PaymentMissing(payment_id))?;
    if let Some(payable) = tx.get_payable(payment.payable_record_id, false).await? {
        scope.ensure_base(tx, payable.base_id).await?;
    }
    info!(payment_id, idempotency_key = key, "payment create replayed");
    Ok(Some(payment))
}

/// 在已加锁的应付上写入一笔付款并重算
/// Insert a payment against an already locked payable and re-derive its totals.
pub async fn apply_payment(
    tx: &mut dyn StoreTx,
    payable: &PayableRow,
    amount: f64,
    payment_date: NaiveDate,
    method: &str,
    reference: &str,
    notes: &str,
) -> ServiceResult<i64> {
    let payment_id = tx
        .insert_payment(&NewPayment {
            payable_record_id: payable.id,
            payment_amount: amount,
            payment_date,
            payment_method: method.to_string(),
            reference_number: reference.to_string(),
            notes: notes.to_string(),
            currency: payable.currency.clone(),
        })
        .await?;
    recompute_payable(tx, payable.id).await?;
    Ok(payment_id)
}

async fn create_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    input: &PaymentInput,
    idem_key: Option<&str>,
) -> ServiceResult<PaymentRow> {
    if let Some(key) = idem_key {
        if let Some(existing) = replay_in_tx(tx, scope, key).await? {
            return Ok(existing);
        }
    }

    let payable = tx
        .get_payable(input.payable_id, true)
        .await?
        .ok_or(ServiceError::PayableMissing(input.payable_id))?;
    scope.ensure_base(tx, payable.base_id).await?;

    if !(input.amount > 0.0) {
        return Err(ServiceError::InvalidAmount(format!(
            "付款金额必须大于 0: {}",
            input.amount
        )));
    }
    let amount = round2(input.amount);
    if amount > payable.remaining_amount + EPSILON {
        return Err(ServiceError::Overpayment {
            amount,
            remaining: payable.remaining_amount,
        });
    }

    let payment_id = apply_payment(
        tx,
        &payable,
        amount,
        input.payment_date,
        input.payment_method.trim(),
        input.reference.trim(),
        input.notes.trim(),
    )
    .await?;

    if let Some(key) = idem_key {
        tx.insert_idempotency(PAYMENT_RESOURCE, key, payment_id)
            .await?;
    }
    info!(
        payment_id,
        payable_id = payable.id,
        amount,
        payment_date = %input.payment_date,
        "payment recorded"
    );
    tx.get_payment(payment_id)
        .await?
        .ok_or(ServiceError::PaymentMissing(payment_id))
}

/// 登记付款；同一幂等键的并发/重复请求只产生一条付款记录
/// Record a payment. Concurrent or repeated requests sharing an idempotency key
/// produce exactly one payment and all observe its id.
pub async fn create_payment(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    input: &PaymentInput,
    idem_key: Option<&str>,
) -> ServiceResult<PaymentRow> {
    with_timeout(settings.mutation_timeout, "create_payment", async {
        let mut tx = store.begin().await?;
        let result = create_in_tx(tx.as_mut(), scope, input, idem_key).await;
        match (finish(tx, result).await, idem_key) {
            (Err(e), Some(key)) if e.is_unique_violation() => {
                let mut tx = store.begin().await?;
                let replay = replay_in_tx(tx.as_mut(), scope, key).await;
                match finish(tx, replay).await? {
                    Some(payment) => Ok(payment),
                    None => Err(e),
                }
            }
            (other, _) => other,
        }
    })
    .await
}

async fn delete_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    payment_id: i64,
) -> ServiceResult<Option<PayableRow>> {
    scope.require_admin()?;
    let payment = tx
        .get_payment(payment_id)
        .await?
        .ok_or(ServiceError::PaymentMissing(payment_id))?;
    let payable_id = payment.payable_record_id;
    tx.get_payable(payable_id, true)
        .await?
        .ok_or(ServiceError::PayableMissing(payable_id))?;

    tx.delete_payment(payment_id).await?;
    let payable = recompute_payable(tx, payable_id).await?;
    info!(
        payment_id,
        payable_id,
        amount = payment.payment_amount,
        status = payable.as_ref().map(|p| p.status.as_str()).unwrap_or("removed"),
        "payment deleted"
    );
    Ok(payable)
}

/// 删除付款并重算所属应付（仅管理员）；应付随之清空被删除时返回 `None`
pub async fn delete_payment(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    payment_id: i64,
) -> ServiceResult<Option<PayableRow>> {
    with_timeout(settings.mutation_timeout, "delete_payment", async {
        let mut tx = store.begin().await?;
        let result = delete_in_tx(tx.as_mut(), scope, payment_id).await;
        finish(tx, result).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::payable::service::set_payable_status;
    use crate::modules::purchase::resolver::LineInput;
    use crate::modules::purchase::service::{create_purchase, PurchaseInput};
    use crate::store::late_key::LateKeyStore;
    use crate::store::MemoryStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn pay(payable_id: i64, amount: f64, date: NaiveDate) -> PaymentInput {
        PaymentInput {
            payable_id,
            amount,
            payment_date: date,
            payment_method: "bank".to_string(),
            reference: "TX-1".to_string(),
            notes: String::new(),
        }
    }

    /// 建一个即时结算应付并返回其 id / Seed one immediate payable of `total`
    async fn payable_of(store: &MemoryStore, total: f64) -> i64 {
        let base = store.add_base("Vientiane", "VTE", "CNY").await;
        let supplier = store.add_supplier("Cash Market", Some("immediate"), None).await;
        let input = PurchaseInput {
            supplier_id: supplier,
            base_id: base,
            purchase_date: d(2025, 1, 15),
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
        };
        create_purchase(store, &LedgerSettings::default(), &AccessScope::All, &input, None)
            .await
            .unwrap()
            .payable_id
            .unwrap()
    }

    async fn payable(store: &MemoryStore, id: i64) -> PayableRow {
        store
            .payables()
            .await
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_full_payment_settles() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 1000.0).await;
        let settings = LedgerSettings::default();
        let payment = create_payment(&store, &settings, &AccessScope::All, &pay(id, 1000.0, d(2025, 2, 1)), None)
            .await
            .unwrap();
        assert_eq!(payment.currency, "CNY");

        let p = payable(&store, id).await;
        assert_eq!(p.paid_amount, 1000.0);
        assert_eq!(p.remaining_amount, 0.0);
        assert_eq!(p.status, "paid");
    }

    #[tokio::test]
    async fn test_payment_order_does_not_matter() {
        let settings = LedgerSettings::default();
        let mut finals = Vec::new();
        for order in [[300.0, 700.0], [700.0, 300.0]] {
            let store = MemoryStore::new();
            let id = payable_of(&store, 1000.0).await;
            let mut small = None;
            for amount in order {
                let date = if amount == 300.0 { d(2025, 5, 1) } else { d(2025, 4, 1) };
                let p = create_payment(&store, &settings, &AccessScope::All, &pay(id, amount, date), None)
                    .await
                    .unwrap();
                if amount == 300.0 {
                    small = Some(p.id);
                }
            }
            let p = payable(&store, id).await;
            finals.push((p.paid_amount, p.remaining_amount, p.status.clone()));

            let after = delete_payment(&store, &settings, &AccessScope::All, small.unwrap())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(after.paid_amount, 700.0);
            assert_eq!(after.remaining_amount, 300.0);
            assert_eq!(after.status, "partial");
        }
        assert_eq!(finals[0], finals[1]);
        assert_eq!(finals[0], (1000.0, 0.0, "paid".to_string()));
    }

    #[tokio::test]
    async fn test_permutations_of_three_payments_converge() {
        let settings = LedgerSettings::default();
        let amounts = [120.5, 79.5, 300.0];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        let mut seen = Vec::new();
        for order in orders {
            let store = MemoryStore::new();
            let id = payable_of(&store, 800.0).await;
            for (day, i) in order.into_iter().enumerate() {
                create_payment(&store, &settings, &AccessScope::All, &pay(id, amounts[i], d(2025, 3, 10 - day as u32)), None)
                    .await
                    .unwrap();
            }
            let p = payable(&store, id).await;
            seen.push((p.paid_amount, p.remaining_amount, p.status));
        }
        assert!(seen.iter().all(|s| *s == (500.0, 300.0, "partial".to_string())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_idempotent_create_yields_one_payment() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 1000.0).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                create_payment(
                    &store,
                    &LedgerSettings::default(),
                    &AccessScope::All,
                    &pay(id, 500.0, d(2025, 2, 1)),
                    Some("K"),
                )
                .await
                .map(|p| p.id)
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        assert_eq!(ids[0], ids[1]);
        assert_eq!(store.payments().await.len(), 1);
        let p = payable(&store, id).await;
        assert_eq!(p.paid_amount, 500.0);
        assert_eq!(p.status, "partial");
    }

    #[tokio::test]
    async fn test_key_committed_after_lookup_replays_winner() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 1000.0).await;
        let settings = LedgerSettings::default();
        let winner = create_payment(&store, &settings, &AccessScope::All, &pay(id, 500.0, d(2025, 2, 1)), Some("K"))
            .await
            .unwrap();

        // 首次查重看不到 K，写入时撞上唯一索引 / the lookup misses K, the insert collides
        let racing = LateKeyStore::new(store.clone(), "K");
        let loser = create_payment(&racing, &settings, &AccessScope::All, &pay(id, 500.0, d(2025, 2, 1)), Some("K"))
            .await
            .unwrap();
        assert_eq!(loser.id, winner.id);
        assert_eq!(store.payments().await.len(), 1);
        let p = payable(&store, id).await;
        assert_eq!(p.paid_amount, 500.0);
        assert_eq!(p.status, "partial");
    }

    #[tokio::test]
    async fn test_overpayment_and_invalid_amount_rejected() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 100.0).await;
        let settings = LedgerSettings::default();

        let err = create_payment(&store, &settings, &AccessScope::All, &pay(id, 150.0, d(2025, 2, 1)), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "overpayment");

        for bad in [0.0, -5.0, f64::NAN] {
            let err = create_payment(&store, &settings, &AccessScope::All, &pay(id, bad, d(2025, 2, 1)), None)
                .await
                .unwrap_err();
            assert_eq!(err.reason(), "invalid-amount");
        }

        let err = create_payment(&store, &settings, &AccessScope::All, &pay(404, 1.0, d(2025, 2, 1)), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "payable-missing");

        assert!(store.payments().await.is_empty());
        let p = payable(&store, id).await;
        assert_eq!(p.remaining_amount, 100.0);
        assert_eq!(p.status, "pending");

        // 剩余不超过一分即视为结清 / a cent left over counts as settled
        create_payment(&store, &settings, &AccessScope::All, &pay(id, 99.99, d(2025, 2, 1)), None)
            .await
            .unwrap();
        assert_eq!(payable(&store, id).await.status, "paid");
    }

    #[tokio::test]
    async fn test_delete_payment_requires_admin() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 100.0).await;
        let settings = LedgerSettings::default();
        let payment = create_payment(&store, &settings, &AccessScope::All, &pay(id, 40.0, d(2025, 2, 1)), None)
            .await
            .unwrap();

        let agent = AccessScope::Bases(vec!["Vientiane".to_string()]);
        let err = delete_payment(&store, &settings, &agent, payment.id).await.unwrap_err();
        assert_eq!(err.reason(), "forbidden");
        let err = delete_payment(&store, &settings, &AccessScope::All, 999).await.unwrap_err();
        assert_eq!(err.reason(), "payment-missing");

        let p = delete_payment(&store, &settings, &AccessScope::All, payment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.paid_amount, 0.0);
        assert_eq!(p.status, "pending");
    }

    #[tokio::test]
    async fn test_set_status_rederives_amounts() {
        let store = MemoryStore::new();
        let id = payable_of(&store, 500.0).await;
        let settings = LedgerSettings::default();
        create_payment(&store, &settings, &AccessScope::All, &pay(id, 200.0, d(2025, 2, 1)), None)
            .await
            .unwrap();

        let paid = set_payable_status(&store, &settings, &AccessScope::All, id, "paid")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.paid_amount, 500.0);
        assert_eq!(paid.remaining_amount, 0.0);
        assert_eq!(paid.status, "paid");
        let payments = store.payments().await;
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().any(|p| p.payment_method == "manual-settlement" && p.payment_amount == 300.0));

        // 幂等 / idempotent
        set_payable_status(&store, &settings, &AccessScope::All, id, "paid")
            .await
            .unwrap();
        assert_eq!(store.payments().await.len(), 2);

        let pending = set_payable_status(&store, &settings, &AccessScope::All, id, "pending")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.paid_amount, 0.0);
        assert_eq!(pending.remaining_amount, 500.0);
        assert_eq!(pending.status, "pending");
        assert!(store.payments().await.is_empty());

        let err = set_payable_status(&store, &settings, &AccessScope::All, id, "partial")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "bad-request");
        let agent = AccessScope::Bases(vec!["Vientiane".to_string()]);
        let err = set_payable_status(&store, &settings, &agent, id, "paid")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "forbidden");
    }
}
