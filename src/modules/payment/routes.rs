use actix_web::{web, HttpRequest};
use serde::Deserialize;
use utoipa::ToSchema;

use super::applicator::{create_payment, delete_payment, PaymentInput};
use crate::api::request::{date_field, idempotency_key, IdQuery};
use crate::api_success;
use crate::app_bootstrap::AppState;
use crate::auth::Claims;
use crate::error::{ApiResponse, AppResult};
use crate::modules::base::scope::AccessScope;
use crate::store::{PayableRow, PaymentRow};

/// 登记付款请求体
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentBody {
    pub payable_id: i64,
    pub amount: f64,
    /// YYYY-MM-DD
    pub payment_date: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default, alias = "notes")]
    pub note: String,
}

impl PaymentBody {
    fn into_input(self) -> AppResult<PaymentInput> {
        Ok(PaymentInput {
            payable_id: self.payable_id,
            amount: self.amount,
            payment_date: date_field("payment_date", &self.payment_date)?,
            payment_method: self.payment_method,
            reference: self.reference,
            notes: self.note,
        })
    }
}

/// 登记付款
#[utoipa::path(
    post,
    path = "/api/payment/create",
    tag = "Payment",
    request_body = PaymentBody,
    params(("Idempotency-Key" = Option<String>, Header, description = "幂等键")),
    responses(
        (status = 200, description = "付款记录"),
        (status = 400, description = "金额非法或超付"),
        (status = 404, description = "应付不存在"),
    )
)]
#[actix_web::post("/api/payment/create")]
pub async fn create(
    state: web::Data<AppState>,
    claims: Claims,
    req: HttpRequest,
    body: web::Json<PaymentBody>,
) -> AppResult<web::Json<ApiResponse<PaymentRow>>> {
    let key = idempotency_key(&req)?;
    let input = body.into_inner().into_input()?;
    let scope = AccessScope::from_claims(&claims);
    let payment = create_payment(
        state.store.as_ref(),
        &state.ledger,
        &scope,
        &input,
        key.as_deref(),
    )
    .await?;
    api_success!(payment)
}

/// 删除付款（仅管理员），返回重算后的应付；应付已被清除时为 null
#[utoipa::path(
    delete,
    path = "/api/payment/delete",
    tag = "Payment",
    params(IdQuery),
    responses(
        (status = 200, description = "重算后的应付"),
        (status = 403, description = "仅管理员"),
    )
)]
#[actix_web::delete("/api/payment/delete")]
pub async fn delete(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
) -> AppResult<web::Json<ApiResponse<Option<PayableRow>>>> {
    let scope = AccessScope::from_claims(&claims);
    let payable = delete_payment(state.store.as_ref(), &state.ledger, &scope, query.id).await?;
    api_success!(payable)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create).service(delete);
}
