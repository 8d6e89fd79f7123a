use actix_web::{web, HttpRequest};
use serde::Deserialize;
use utoipa::ToSchema;

use super::resolver::LineInput;
use super::service::{
    create_purchase, delete_purchases, purchase_detail, update_purchase, DeleteOutcome,
    PurchaseDetail, PurchaseInput, PurchaseOutcome,
};
use crate::api::request::{date_field, idempotency_key, IdQuery};
use crate::api_success;
use crate::app_bootstrap::AppState;
use crate::auth::Claims;
use crate::error::{AppResult, ApiResponse};
use crate::modules::base::scope::AccessScope;

/// 采购明细行
#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseItemBody {
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub unit: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub amount: f64,
}

/// 新建 / 整单替换采购请求体
#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseBody {
    pub supplier_id: i64,
    pub base_id: i64,
    /// YYYY-MM-DD
    pub purchase_date: String,
    #[serde(default)]
    pub total_amount: f64,
    pub currency: Option<String>,
    #[serde(default)]
    pub order_number: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub items: Vec<PurchaseItemBody>,
}

impl PurchaseBody {
    fn into_input(self) -> AppResult<PurchaseInput> {
        Ok(PurchaseInput {
            supplier_id: self.supplier_id,
            base_id: self.base_id,
            purchase_date: date_field("purchase_date", &self.purchase_date)?,
            total_amount: self.total_amount,
            currency: self.currency,
            order_number: self.order_number,
            receiver: self.receiver,
            items: self
                .items
                .into_iter()
                .map(|i| LineInput {
                    product_id: i.product_id,
                    product_name: i.product_name,
                    unit: i.unit,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    amount: i.amount,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchDeleteBody {
    pub ids: Vec<i64>,
}

/// 新建采购
#[utoipa::path(
    post,
    path = "/api/purchase/create",
    tag = "Purchase",
    request_body = PurchaseBody,
    params(("Idempotency-Key" = Option<String>, Header, description = "幂等键")),
    responses(
        (status = 200, description = "采购及所挂应付", body = PurchaseOutcome),
        (status = 400, description = "明细或金额非法"),
        (status = 409, description = "币种冲突"),
    )
)]
#[actix_web::post("/api/purchase/create")]
pub async fn create(
    state: web::Data<AppState>,
    claims: Claims,
    req: HttpRequest,
    body: web::Json<PurchaseBody>,
) -> AppResult<web::Json<ApiResponse<PurchaseOutcome>>> {
    let key = idempotency_key(&req)?;
    let input = body.into_inner().into_input()?;
    let scope = AccessScope::from_claims(&claims);
    let outcome = create_purchase(
        state.store.as_ref(),
        &state.ledger,
        &scope,
        &input,
        key.as_deref(),
    )
    .await?;
    api_success!(outcome)
}

/// 整单替换采购（明细全量替换）
#[utoipa::path(
    put,
    path = "/api/purchase/update",
    tag = "Purchase",
    params(IdQuery),
    request_body = PurchaseBody,
    responses(
        (status = 200, description = "更新后的采购及应付", body = PurchaseOutcome),
        (status = 403, description = "已结清的采购不可缩减"),
    )
)]
#[actix_web::put("/api/purchase/update")]
pub async fn update(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
    body: web::Json<PurchaseBody>,
) -> AppResult<web::Json<ApiResponse<PurchaseOutcome>>> {
    let input = body.into_inner().into_input()?;
    let scope = AccessScope::from_claims(&claims);
    let outcome =
        update_purchase(state.store.as_ref(), &state.ledger, &scope, query.id, &input).await?;
    api_success!(outcome)
}

/// 删除单条采购
#[utoipa::path(
    delete,
    path = "/api/purchase/delete",
    tag = "Purchase",
    params(IdQuery),
    responses(
        (status = 200, description = "已删除", body = DeleteOutcome),
        (status = 403, description = "已付款的采购被锁定"),
        (status = 404, description = "采购不存在"),
    )
)]
#[actix_web::delete("/api/purchase/delete")]
pub async fn delete(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
) -> AppResult<web::Json<ApiResponse<DeleteOutcome>>> {
    let scope = AccessScope::from_claims(&claims);
    let outcome =
        delete_purchases(state.store.as_ref(), &state.ledger, &scope, &[query.id]).await?;
    api_success!(outcome)
}

/// 批量删除采购（整体成功或整体回滚）
#[utoipa::path(
    post,
    path = "/api/purchase/batch-delete",
    tag = "Purchase",
    request_body = BatchDeleteBody,
    responses((status = 200, description = "已删除", body = DeleteOutcome))
)]
#[actix_web::post("/api/purchase/batch-delete")]
pub async fn batch_delete(
    state: web::Data<AppState>,
    claims: Claims,
    body: web::Json<BatchDeleteBody>,
) -> AppResult<web::Json<ApiResponse<DeleteOutcome>>> {
    let scope = AccessScope::from_claims(&claims);
    let outcome =
        delete_purchases(state.store.as_ref(), &state.ledger, &scope, &body.ids).await?;
    api_success!(outcome)
}

/// 采购详情：表头、明细、当前应付
#[utoipa::path(
    get,
    path = "/api/purchase/detail",
    tag = "Purchase",
    params(IdQuery),
    responses((status = 200, description = "采购详情"))
)]
#[actix_web::get("/api/purchase/detail")]
pub async fn detail(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
) -> AppResult<web::Json<ApiResponse<PurchaseDetail>>> {
    let scope = AccessScope::from_claims(&claims);
    let detail = purchase_detail(state.store.as_ref(), &scope, query.id).await?;
    api_success!(detail)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create)
        .service(update)
        .service(delete)
        .service(batch_delete)
        .service(detail);
}
