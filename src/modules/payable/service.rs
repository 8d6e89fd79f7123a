//! 应付查询与管理员状态修改
//! Payable read paths and the admin status override.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::info;
use v::http::pagination::{PageQuery, Paged};

use super::aggregator::recompute_payable;
use super::amounts::PayableStatus;
use crate::modules::base::scope::AccessScope;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::modules::payment::applicator::apply_payment;
use crate::modules::tx::{finish, with_timeout, LedgerSettings};
use crate::store::{
    LinkRow, PayableFilter, PayableRow, PayableView, PaymentRow, PurchaseItemRow, PurchaseRow,
    Store, StoreTx,
};

pub const MANUAL_SETTLEMENT: &str = "manual-settlement";

/// 列表筛选条件 / Payable list filters
#[derive(Debug, Clone, Default)]
pub struct PayableQuery {
    pub supplier: Option<String>,
    pub status: Option<String>,
    pub base: Option<String>,
    pub created_from: Option<NaiveDateTime>,
    pub created_to: Option<NaiveDateTime>,
    pub page: PageQuery,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedPurchase {
    pub link: LinkRow,
    pub purchase: Option<PurchaseRow>,
    pub items: Vec<PurchaseItemRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayableDetail {
    pub payable: PayableView,
    pub links: Vec<LinkedPurchase>,
    /// 即时结算应付对应的采购 / the purchase behind an immediate payable
    pub purchase: Option<LinkedPurchaseHeader>,
    pub payments: Vec<PaymentRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedPurchaseHeader {
    pub purchase: PurchaseRow,
    pub items: Vec<PurchaseItemRow>,
}

async fn list_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    query: &PayableQuery,
) -> ServiceResult<Paged<PayableView>> {
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        if PayableStatus::parse(status).is_none() {
            return Err(ServiceError::BadRequest(format!("未知状态: {}", status)));
        }
    }
    let page = &query.page;
    let filter = PayableFilter {
        supplier_name: query.supplier.clone().filter(|s| !s.trim().is_empty()),
        status: query
            .status
            .as_deref()
            .and_then(PayableStatus::parse)
            .map(|s| s.as_str().to_string()),
        base_name: query.base.clone().filter(|s| !s.trim().is_empty()),
        created_from: query.created_from,
        created_to: query.created_to,
        base_ids: scope.allowed_base_ids(tx).await?,
        offset: page.offset(),
        limit: page.limit(),
    };
    let (rows, total) = tx.list_payables(&filter).await?;
    Ok(Paged::new(rows, total, page))
}

/// 分页列出应付，基地代理只能看到授权基地
pub async fn list_payables(
    store: &dyn Store,
    scope: &AccessScope,
    query: &PayableQuery,
) -> ServiceResult<Paged<PayableView>> {
    let mut tx = store.begin().await?;
    let result = list_in_tx(tx.as_mut(), scope, query).await;
    finish(tx, result).await
}

async fn detail_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    payable_id: i64,
) -> ServiceResult<PayableDetail> {
    let payable = tx
        .get_payable_view(payable_id)
        .await?
        .ok_or(ServiceError::PayableMissing(payable_id))?;
    scope.ensure_base(tx, payable.record.base_id).await?;

    let mut links = Vec::new();
    for link in tx.list_links(payable_id).await? {
        let purchase = tx.get_purchase(link.purchase_entry_id, false).await?;
        let items = tx.list_purchase_items(link.purchase_entry_id).await?;
        links.push(LinkedPurchase {
            link,
            purchase,
            items,
        });
    }

    let purchase = match payable.record.purchase_entry_id {
        Some(purchase_id) => match tx.get_purchase(purchase_id, false).await? {
            Some(purchase) => Some(LinkedPurchaseHeader {
                items: tx.list_purchase_items(purchase_id).await?,
                purchase,
            }),
            None => None,
        },
        None => None,
    };
    let payments = tx.list_payments(payable_id).await?;

    Ok(PayableDetail {
        payable,
        links,
        purchase,
        payments,
    })
}

/// 应付详情：关联采购、明细、付款
pub async fn payable_detail(
    store: &dyn Store,
    scope: &AccessScope,
    payable_id: i64,
) -> ServiceResult<PayableDetail> {
    let mut tx = store.begin().await?;
    let result = detail_in_tx(tx.as_mut(), scope, payable_id).await;
    finish(tx, result).await
}

async fn set_status_in_tx(
    tx: &mut dyn StoreTx,
    scope: &AccessScope,
    payable_id: i64,
    target: PayableStatus,
) -> ServiceResult<Option<PayableRow>> {
    scope.require_admin()?;
    let payable = tx
        .get_payable(payable_id, true)
        .await?
        .ok_or(ServiceError::PayableMissing(payable_id))?;

    match target {
        PayableStatus::Partial => {
            return Err(ServiceError::BadRequest(
                "partial 由付款推导，不能直接设置".to_string(),
            ));
        }
        PayableStatus::Paid => {
            // 无关联无付款的聚合应付在重算时被清除，无需结清
            let Some(current) = recompute_payable(tx, payable_id).await? else {
                info!(payable_id, "empty payable removed instead of settled");
                return Ok(None);
            };
            if current.remaining_amount > 0.0 {
                let today = Local::now().date_naive();
                let payment_id = apply_payment(
                    tx,
                    &current,
                    current.remaining_amount,
                    today,
                    MANUAL_SETTLEMENT,
                    "",
                    "",
                )
                .await?;
                info!(
                    payable_id,
                    payment_id,
                    amount = current.remaining_amount,
                    "balancing payment inserted"
                );
            }
        }
        PayableStatus::Pending => {
            let removed = tx.delete_payments_for_payable(payable_id).await?;
            if removed > 0 {
                info!(payable_id, removed, "payments cleared");
            }
        }
    }

    let updated = recompute_payable(tx, payable_id).await?;
    info!(
        payable_id,
        from = %payable.status,
        to = updated.as_ref().map(|p| p.status.as_str()).unwrap_or("removed"),
        "payable status set"
    );
    Ok(updated)
}

/// 管理员直接设置应付状态；金额随之重新推导，保证不变量成立
/// Admin status override. Amounts are re-derived atomically so the ledger stays consistent.
/// Returns `None` when clearing payments left an empty aggregate payable that was removed.
pub async fn set_payable_status(
    store: &dyn Store,
    settings: &LedgerSettings,
    scope: &AccessScope,
    payable_id: i64,
    status: &str,
) -> ServiceResult<Option<PayableRow>> {
    let target = PayableStatus::parse(status)
        .ok_or_else(|| ServiceError::BadRequest(format!("未知状态: {}", status)))?;
    with_timeout(settings.mutation_timeout, "set_payable_status", async {
        let mut tx = store.begin().await?;
        let result = set_status_in_tx(tx.as_mut(), scope, payable_id, target).await;
        finish(tx, result).await
    })
    .await
}
