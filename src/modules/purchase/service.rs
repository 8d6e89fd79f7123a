//! 采购写路径编排：解析明细 -> 落库 -> 分桶挂账，全部在一个事务内
//! Purchase mutation orchestration. Each operation is one transaction under a deadline.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::resolver::{resolve_line, LineInput};
use crate::comm::serde_fmt::round2;
use crate::modules::base::scope::AccessScope;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::modules::payable::aggregator::{
    bucket_of, detach_purchase, link_purchase_to_payable, payable_in_bucket, period_for,
    resize_immediate, resize_link,
};
use crate::modules::tx::{finish, with_timeout, LedgerSettings};
use crate::store::{
    BaseRow, NewPurchase, NewPurchaseItem, PurchaseItemRow, PurchaseRow, Store, StoreTx,
    SupplierRow,
};

pub const PURCHASE_RESOURCE: &str = "purchase";
pub const DEFAULT_CURRENCY: &str = "CNY";

/// 采购写入参数 / Purchase create/update input
#[derive(Debug, Clone)]
pub struct PurchaseInput {
    pub supplier_id: i64,
    pub base_id: i64,
    pub purchase_date: NaiveDate,
    pub total_amount: f64,
    pub currency: Option<String>,
    pub order_number: String,
    pub receiver: String,
    pub items: Vec<LineInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PurchaseOutcome {
    pub purchase_id: i64,
    pub payable_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DeleteOutcome {
    pub deleted: Vec<i64>,
    pub affected_payables: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDetail {
    pub purchase: PurchaseRow,
    pub items: Vec<PurchaseItemRow>,
    pub payable_id: Option<i64>,
}

struct Prepared {
    header: NewPurchase,
    items: Vec<NewPurchaseItem>,
}

fn normalize_currency(raw: Option<&str>, base: &BaseRow) -> ServiceResult<String> {
    let code = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(c) => c.to_ascii_uppercase(),
        None if !base.currency.trim().is_empty() => base.currency.trim().to_ascii_uppercase(),
        None => DEFAULT_CURRENCY.to_string(),
    };
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ServiceError::BadRequest(format!("币种格式错误: {}", code)));
    }
    Ok(code)
}

async fn load_parties(
    tx: &mut dyn StoreTx,
    input: &PurchaseInput,
) -> ServiceResult<(BaseRow, SupplierRow)> {
    let base = tx
        .get_base(input.base_id)
        .await?
        .ok_or(ServiceError::BaseMissing(input.base_id))?;
    let supplier = tx
        .get_supplier(input.supplier_id)
        .await?
        .ok_or(ServiceError::SupplierMissing(input.supplier_id))?;
    Ok((base, supplier))
}

async fn prepare(
    tx: &mut dyn StoreTx,
    settings: &LedgerSettings,
    input: &PurchaseInput,
    base: &BaseRow,
) -> ServiceResult<Prepared> {
    let currency = normalize_currency(input.currency.as_deref(), base)?;

    let mut items = Vec::with_capacity(input.items.len());
    for line in &input.items {
        items.push(
            resolve_line(
                tx,
                input.supplier_id,
                input.purchase_date,
                line,
                settings.strict_product_supplier,
            )
            .await?,
        );
    }

    // 表头总额优先，否则取明细之和
    let total = if input.total_amount > 0.0 {
        round2(input.total_amount)
    } else {
        round2(items.iter().map(|i| i.amount).sum())
    };
    if !(total > 0.0) {
        return Err(ServiceError::BadRequest("采购总额必须大于 0".to_string()));
    }

    Ok(Prepared {
        header: NewPurchase {
            supplier_id: input.supplier_id,
            base_id: input.base_id,
            purchase_date: input.purchase_date,
            total_amount: total,
            currency,
            order_number: input.order_number.trim().to_string(),
            receiver: input.receiver.trim().to_string(),
        },
        items,
    })
}

/// 采购当前挂在哪条应付上 / The payable a purchase currently feeds
async fn current_payable_id(tx: &mut dyn StoreTx, purchase_id: i64) -> ServiceResult<Option<i64>> {
    if let Some(link) = tx.find_link_by_purchase(purchase_id).await? {
        return Ok(Some(link.payable_record_id));
    }
    Ok(tx.find_payable_by_purchase(purchase_id).await?.map(|p| p.id))
}

async fn replay_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    key: &str,
) -> ServiceResult<Option<PurchaseOutcome>> {
    let Some(purchase_id) = tx.find_idempotency(PURCHASE_RESOURCE, key).await? else {
        return Ok(None);
    };
    let purchase = tx
        .get_purchase(purchase_id, false)
        .await?
        .ok_or(ServiceError::PurchaseMissing(purchase_id))?;
    scope.ensure_base(tx, purchase.base_id).await?;
    let payable_id = current_payable_id(tx, purchase_id).await?;
    info!(purchase_id, idempotency_key = key, "purchase create replayed");
    Ok(Some(PurchaseOutcome {
        purchase_id,
        payable_id,
    }))
}

async fn create_in_tx(
    tx: &mut dyn StoreTx,
    settings: &LedgerSettings,
    scope: &AccessScope,
    input: &PurchaseInput,
    idem_key: Option<&str>,
) -> ServiceResult<PurchaseOutcome> {
    if let Some(key) = idem_key {
        if let Some(outcome) = replay_in_tx(tx, scope, key).await? {
            return Ok(outcome);
        }
    }

    scope.ensure_base(tx, input.base_id).await?;
    let (base, supplier) = load_parties(tx, input).await?;
    let prepared = prepare(tx, settings, input, &base).await?;

    let purchase_id = tx.insert_purchase(&prepared.header).await?;
    tx.insert_purchase_items(purchase_id, &prepared.items).await?;
    let purchase = tx
        .get_purchase(purchase_id, false)
        .await?
        .ok_or(ServiceError::PurchaseMissing(purchase_id))?;

    let payable_id = link_purchase_to_payable(tx, &purchase, &supplier).await?;

    if let Some(key) = idem_key {
        tx.insert_idempotency(PURCHASE_RESOURCE, key, purchase_id)
            .await?;
    }
    info!(
        purchase_id,
        payable_id,
        supplier_id = purchase.supplier_id,
        base_id = purchase.base_id,
        total = purchase.total_amount,
        items = prepared.items.len(),
        "purchase created"
    );
    Ok(PurchaseOutcome {
        purchase_id,
        payable_id: Some(payable_id),
    })
}

/// 新建采购；带幂等键的重复请求返回首次结果
/// Create a purchase. A repeated `Idempotency-Key` returns the first result unchanged.
pub async fn create_purchase(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    input: &PurchaseInput,
    idem_key: Option<&str>,
) -> ServiceResult<PurchaseOutcome> {
    with_timeout(settings.mutation_timeout, "create_purchase", async {
        let mut tx = store.begin().await?;
        let result = create_in_tx(tx.as_mut(), settings, scope, input, idem_key).await;
        match (finish(tx, result).await, idem_key) {
            // 并发请求抢先写入了同一幂等键：回放对方的结果
            (Err(e), Some(key)) if e.is_unique_violation() => {
                let mut tx = store.begin().await?;
                let replay = replay_in_tx(tx.as_mut(), scope, key).await;
                match finish(tx, replay).await? {
                    Some(outcome) => Ok(outcome),
                    None => Err(e),
                }
            }
            (other, _) => other,
        }
    })
    .await
}

async fn update_in_tx(
    tx: &mut dyn StoreTx,
    settings: &LedgerSettings,
    scope: &AccessScope,
    purchase_id: i64,
    input: &PurchaseInput,
) -> ServiceResult<PurchaseOutcome> {
    let existing = tx
        .get_purchase(purchase_id, true)
        .await?
        .ok_or(ServiceError::PurchaseMissing(purchase_id))?;
    scope.ensure_base(tx, existing.base_id).await?;
    if input.base_id != existing.base_id {
        scope.ensure_base(tx, input.base_id).await?;
    }
    let (base, supplier) = load_parties(tx, input).await?;
    let prepared = prepare(tx, settings, input, &base).await?;

    tx.delete_purchase_items(purchase_id).await?;
    tx.insert_purchase_items(purchase_id, &prepared.items).await?;
    tx.update_purchase(purchase_id, &prepared.header).await?;
    let purchase = tx
        .get_purchase(purchase_id, false)
        .await?
        .ok_or(ServiceError::PurchaseMissing(purchase_id))?;

    let key = period_for(&purchase, &supplier);
    let payable_id = if key.is_immediate() {
        match tx.find_payable_by_purchase(purchase_id).await? {
            Some(p)
                if p.supplier_id == Some(purchase.supplier_id)
                    && p.base_id == purchase.base_id
                    && p.currency == purchase.currency =>
            {
                resize_immediate(tx, &p, &purchase, &key).await?
            }
            _ => {
                detach_purchase(tx, purchase_id).await?;
                link_purchase_to_payable(tx, &purchase, &supplier).await?
            }
        }
    } else {
        let bucket = bucket_of(&purchase, &key);
        let link = tx.find_link_by_purchase(purchase_id).await?;
        let current = match &link {
            Some(l) => tx.get_payable(l.payable_record_id, true).await?,
            None => None,
        };
        match (link, current) {
            (Some(link), Some(p)) if payable_in_bucket(&p, &bucket) && p.currency == purchase.currency => {
                resize_link(tx, &link, &purchase).await?
            }
            _ => {
                // 分桶变化：先摘后挂 / bucket changed: detach, then link afresh
                let previous = detach_purchase(tx, purchase_id).await?;
                let target = link_purchase_to_payable(tx, &purchase, &supplier).await?;
                info!(purchase_id, from = ?previous, to = target, "purchase moved between payables");
                target
            }
        }
    };

    info!(
        purchase_id,
        payable_id,
        total = purchase.total_amount,
        items = prepared.items.len(),
        "purchase updated"
    );
    Ok(PurchaseOutcome {
        purchase_id,
        payable_id: Some(payable_id),
    })
}

/// 整单替换采购（明细全量替换）/ Full replace of a purchase and its items
pub async fn update_purchase(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    purchase_id: i64,
    input: &PurchaseInput,
) -> ServiceResult<PurchaseOutcome> {
    with_timeout(settings.mutation_timeout, "update_purchase", async {
        let mut tx = store.begin().await?;
        let result = update_in_tx(tx.as_mut(), settings, scope, purchase_id, input).await;
        finish(tx, result).await
    })
    .await
}

async fn delete_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    ids: &[i64],
) -> ServiceResult<DeleteOutcome> {
    let mut affected = BTreeSet::new();
    for &purchase_id in ids {
        let purchase = tx
            .get_purchase(purchase_id, true)
            .await?
            .ok_or(ServiceError::PurchaseMissing(purchase_id))?;
        scope.ensure_base(tx, purchase.base_id).await?;

        if let Some(payable_id) = detach_purchase(tx, purchase_id).await? {
            affected.insert(payable_id);
        }
        tx.delete_purchase_items(purchase_id).await?;
        tx.delete_purchase(purchase_id).await?;
        info!(purchase_id, "purchase deleted");
    }
    Ok(DeleteOutcome {
        deleted: ids.to_vec(),
        affected_payables: affected.into_iter().collect(),
    })
}

/// 删除一批采购；任何一条失败则整体回滚
/// Delete purchases atomically: one refusal rolls the whole batch back.
pub async fn delete_purchases(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    ids: &[i64],
) -> ServiceResult<DeleteOutcome> {
    let mut unique_ids: Vec<i64> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique_ids.contains(id) {
            unique_ids.push(*id);
        }
    }
    if unique_ids.is_empty() {
        return Err(ServiceError::BadRequest("ids 不能为空".to_string()));
    }

    with_timeout(settings.mutation_timeout, "delete_purchases", async {
        let mut tx = store.begin().await?;
        let result = delete_in_tx(tx.as_mut(), scope, &unique_ids).await;
        finish(tx, result).await
    })
    .await
}

async fn detail_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    purchase_id: i64,
) -> ServiceResult<PurchaseDetail> {
    let purchase = tx
        .get_purchase(purchase_id, false)
        .await?
        .ok_or(ServiceError::PurchaseMissing(purchase_id))?;
    scope.ensure_base(tx, purchase.base_id).await?;
    let items = tx.list_purchase_items(purchase_id).await?;
    let payable_id = current_payable_id(tx, purchase_id).await?;
    Ok(PurchaseDetail {
        purchase,
        items,
        payable_id,
    })
}

pub async fn purchase_detail(
    store: &dyn Store,
    scope: &AccessScope,
    purchase_id: i64,
) -> ServiceResult<PurchaseDetail> {
    let mut tx = store.begin().await?;
    let result = detail_in_tx(tx.as_mut(), scope, purchase_id).await;
    finish(tx, result).await
}
