//! 应付聚合：把已落库的采购挂到 (供应商, 基地, 账期) 分桶上的应付记录
//! Payable aggregation. Every function expects to run inside the caller's transaction.

use tracing::{debug, info};

use super::amounts::{derive_amounts, PayableStatus, EPSILON};
use super::period::{classify, PeriodKey, SettlementType};
use crate::comm::serde_fmt::round2;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::store::{
    LinkRow, NewLink, NewPayable, PayableBucket, PayableRow, PurchaseRow, StoreTx, SupplierRow,
};

pub fn period_for(purchase: &PurchaseRow, supplier: &SupplierRow) -> PeriodKey {
    classify(
        purchase.purchase_date,
        SettlementType::parse(supplier.settlement_type.as_deref()),
        supplier.settlement_day,
    )
}

pub fn bucket_of(purchase: &PurchaseRow, key: &PeriodKey) -> PayableBucket {
    PayableBucket {
        supplier_id: purchase.supplier_id,
        base_id: purchase.base_id,
        settlement_type: key.settlement_type.as_str().to_string(),
        period_month: key.period_month.clone(),
        period_half: key.period_half.clone(),
    }
}

/// 该应付当前是否就是 `bucket` 的聚合应付
pub fn payable_in_bucket(payable: &PayableRow, bucket: &PayableBucket) -> bool {
    !payable.is_immediate()
        && payable.supplier_id == Some(bucket.supplier_id)
        && payable.base_id == bucket.base_id
        && payable.settlement_type == bucket.settlement_type
        && payable.period_month == bucket.period_month
        && payable.period_half == bucket.period_half
}

/// 将采购挂到应付上，返回应付 id
/// Attach a committed-in-this-transaction purchase to its payable and return the payable id.
pub async fn link_purchase_to_payable(
    tx: &mut dyn StoreTx,
    purchase: &PurchaseRow,
    supplier: &SupplierRow,
) -> ServiceResult<i64> {
    let key = period_for(purchase, supplier);

    if key.is_immediate() {
        let (totals, status) = derive_amounts(purchase.total_amount, 0.0);
        let id = tx
            .insert_payable(&NewPayable {
                supplier_id: Some(purchase.supplier_id),
                base_id: purchase.base_id,
                purchase_entry_id: Some(purchase.id),
                settlement_type: key.settlement_type.as_str().to_string(),
                period_month: String::new(),
                period_half: String::new(),
                total_amount: totals.total_amount,
                paid_amount: totals.paid_amount,
                remaining_amount: totals.remaining_amount,
                currency: purchase.currency.clone(),
                status: status.as_str().to_string(),
                due_date: key.due_date,
            })
            .await?;
        info!(
            purchase_id = purchase.id,
            payable_id = id,
            total = totals.total_amount,
            "immediate payable created"
        );
        return Ok(id);
    }

    // 先锁 (supplier, base) 范围，再查找/创建，避免并发各建一条
    tx.lock_bucket(purchase.supplier_id, purchase.base_id).await?;
    let bucket = bucket_of(purchase, &key);

    let target = match tx.find_open_payable(&bucket).await? {
        Some(open) => {
            if open.currency != purchase.currency {
                return Err(ServiceError::CurrencyMismatch {
                    expected: open.currency,
                    actual: purchase.currency.clone(),
                });
            }
            open.id
        }
        None => {
            let id = tx
                .insert_payable(&NewPayable {
                    supplier_id: Some(purchase.supplier_id),
                    base_id: purchase.base_id,
                    purchase_entry_id: None,
                    settlement_type: bucket.settlement_type.clone(),
                    period_month: bucket.period_month.clone(),
                    period_half: bucket.period_half.clone(),
                    total_amount: 0.0,
                    paid_amount: 0.0,
                    remaining_amount: 0.0,
                    currency: purchase.currency.clone(),
                    status: PayableStatus::Pending.as_str().to_string(),
                    due_date: key.due_date,
                })
                .await?;
            info!(
                payable_id = id,
                supplier_id = bucket.supplier_id,
                base_id = bucket.base_id,
                settlement_type = %bucket.settlement_type,
                period_month = %bucket.period_month,
                period_half = %bucket.period_half,
                "aggregate payable opened"
            );
            id
        }
    };

    let link = NewLink {
        payable_record_id: target,
        purchase_entry_id: purchase.id,
        amount: round2(purchase.total_amount),
        currency: purchase.currency.clone(),
    };
    match tx.insert_link(&link).await {
        Ok(_) => {}
        Err(e) if e.is_unique_violation() => {
            // 已挂过：读出后继续 / already linked: read it back and carry on
            match tx.find_link_by_purchase(purchase.id).await? {
                Some(existing) if existing.payable_record_id == target => {
                    debug!(purchase_id = purchase.id, payable_id = target, "link exists, refreshing amount");
                    tx.update_link_amount(existing.id, link.amount, &link.currency)
                        .await?;
                }
                _ => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    }

    recompute_payable(tx, target).await?;
    info!(
        purchase_id = purchase.id,
        payable_id = target,
        amount = link.amount,
        "purchase linked"
    );
    Ok(target)
}

/// 重新汇总关联与付款并推导状态；无关联且无付款的聚合应付被删除
/// Re-sum links and payments, derive status and persist. An aggregate payable left
/// with neither links nor payments is deleted and `None` is returned.
pub async fn recompute_payable(
    tx: &mut dyn StoreTx,
    payable_id: i64,
) -> ServiceResult<Option<PayableRow>> {
    let payable = tx
        .get_payable(payable_id, true)
        .await?
        .ok_or(ServiceError::PayableMissing(payable_id))?;
    let (paid, payment_count) = tx.sum_payments(payable_id).await?;

    let total = if payable.is_immediate() {
        payable.total_amount
    } else {
        let (sum, link_count) = tx.sum_links(payable_id).await?;
        if link_count == 0 && payment_count == 0 {
            tx.delete_payable(payable_id).await?;
            info!(payable_id, "empty aggregate payable removed");
            return Ok(None);
        }
        sum
    };

    let (totals, status) = derive_amounts(total, paid);
    tx.update_payable_totals(payable_id, &totals, status.as_str())
        .await?;
    debug!(
        payable_id,
        total = totals.total_amount,
        paid = totals.paid_amount,
        remaining = totals.remaining_amount,
        status = status.as_str(),
        "payable recomputed"
    );
    Ok(Some(PayableRow {
        total_amount: totals.total_amount,
        paid_amount: totals.paid_amount,
        remaining_amount: totals.remaining_amount,
        status: status.as_str().to_string(),
        ..payable
    }))
}

/// 应付总额降到已付以下则拒绝 / refuse to push a payable's total below what is already paid
async fn ensure_covers_paid(
    tx: &mut dyn StoreTx,
    payable_id: i64,
    new_total: f64,
    purchase_id: i64,
) -> ServiceResult<()> {
    let (paid, _) = tx.sum_payments(payable_id).await?;
    if paid > new_total + EPSILON {
        return Err(ServiceError::SettledPurchaseLocked(format!(
            "采购 {} 所属应付 {} 已付 {:.2}，调整后总额 {:.2}",
            purchase_id, payable_id, paid, new_total
        )));
    }
    Ok(())
}

/// 从应付上摘下采购（删除或移桶前调用），返回受影响的应付 id
/// Detach a purchase from whatever payable it feeds; returns that payable's id.
pub async fn detach_purchase(tx: &mut dyn StoreTx, purchase_id: i64) -> ServiceResult<Option<i64>> {
    if let Some(link) = tx.find_link_by_purchase(purchase_id).await? {
        let payable_id = link.payable_record_id;
        tx.get_payable(payable_id, true)
            .await?
            .ok_or(ServiceError::PayableMissing(payable_id))?;
        let (links_total, link_count) = tx.sum_links(payable_id).await?;
        let (_, payment_count) = tx.sum_payments(payable_id).await?;
        // 最后一条关联不能留下只有付款的应付 / the last link may not orphan payments
        if link_count <= 1 && payment_count > 0 {
            return Err(ServiceError::SettledPurchaseLocked(format!(
                "采购 {} 是应付 {} 的最后一笔关联，且已有 {} 笔付款",
                purchase_id, payable_id, payment_count
            )));
        }
        ensure_covers_paid(tx, payable_id, round2(links_total - link.amount), purchase_id).await?;

        tx.delete_link(link.id).await?;
        recompute_payable(tx, payable_id).await?;
        info!(purchase_id, payable_id, amount = link.amount, "purchase detached");
        return Ok(Some(payable_id));
    }

    if let Some(payable) = tx.find_payable_by_purchase(purchase_id).await? {
        let (_, payments) = tx.sum_payments(payable.id).await?;
        if payments > 0 {
            return Err(ServiceError::SettledPurchaseLocked(format!(
                "采购 {} 的即时应付 {} 已有 {} 笔付款",
                purchase_id, payable.id, payments
            )));
        }
        tx.delete_payable(payable.id).await?;
        info!(purchase_id, payable_id = payable.id, "immediate payable removed");
        return Ok(Some(payable.id));
    }

    Ok(None)
}

/// 分桶不变时原地更新关联金额 / Same bucket: update the link amount in place
pub async fn resize_link(
    tx: &mut dyn StoreTx,
    link: &LinkRow,
    purchase: &PurchaseRow,
) -> ServiceResult<i64> {
    let payable_id = link.payable_record_id;
    let amount = round2(purchase.total_amount);
    let payable = tx
        .get_payable(payable_id, true)
        .await?
        .ok_or(ServiceError::PayableMissing(payable_id))?;
    // 已结清的应付不再接收新金额，否则同一分桶会出现两条未结应付
    if payable.status == PayableStatus::Paid.as_str() && (amount - link.amount).abs() > EPSILON {
        return Err(ServiceError::SettledPurchaseLocked(format!(
            "采购 {} 所属应付 {} 已结清，金额不能从 {:.2} 改为 {:.2}",
            purchase.id, payable_id, link.amount, amount
        )));
    }
    let (links_total, _) = tx.sum_links(payable_id).await?;
    ensure_covers_paid(tx, payable_id, round2(links_total - link.amount + amount), purchase.id).await?;

    tx.update_link_amount(link.id, amount, &purchase.currency)
        .await?;
    recompute_payable(tx, payable_id).await?;
    info!(purchase_id = purchase.id, payable_id, amount, "link amount updated");
    Ok(payable_id)
}

/// 即时应付随采购改额、改期 / Immediate payable follows its purchase's total and date
pub async fn resize_immediate(
    tx: &mut dyn StoreTx,
    payable: &PayableRow,
    purchase: &PurchaseRow,
    key: &PeriodKey,
) -> ServiceResult<i64> {
    let total = round2(purchase.total_amount);
    ensure_covers_paid(tx, payable.id, total, purchase.id).await?;

    let (paid, _) = tx.sum_payments(payable.id).await?;
    let (totals, status) = derive_amounts(total, paid);
    tx.update_payable_totals(payable.id, &totals, status.as_str())
        .await?;
    tx.update_payable_due_date(payable.id, key.due_date).await?;
    info!(purchase_id = purchase.id, payable_id = payable.id, total, "immediate payable updated");
    Ok(payable.id)
}
