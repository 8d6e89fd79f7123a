use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use v::http::pagination::{build_link_header, PageQuery};

use super::service::{list_payables, payable_detail, set_payable_status, PayableDetail, PayableQuery};
use crate::api::request::{datetime_bound, IdQuery};
use crate::api_success;
use crate::app_bootstrap::AppState;
use crate::auth::Claims;
use crate::error::{ApiResponse, AppResult};
use crate::modules::base::scope::AccessScope;
use crate::store::PayableRow;

/// 应付列表查询参数
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayableListQuery {
    /// 供应商名称（模糊）
    pub supplier: Option<String>,
    /// pending / partial / paid
    pub status: Option<String>,
    /// 基地名称
    pub base: Option<String>,
    /// 创建时间下界，YYYY-MM-DD 或 YYYY-MM-DD HH:MM:SS
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PayableListQuery {
    fn into_query(self) -> AppResult<PayableQuery> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(PayableQuery {
            supplier: non_empty(self.supplier),
            status: non_empty(self.status),
            base: non_empty(self.base),
            created_from: non_empty(self.created_from)
                .map(|raw| datetime_bound("created_from", &raw, false))
                .transpose()?,
            created_to: non_empty(self.created_to)
                .map(|raw| datetime_bound("created_to", &raw, true))
                .transpose()?,
            page: PageQuery {
                page: self.page,
                page_size: self.page_size,
            },
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusBody {
    /// paid / pending
    pub status: String,
}

/// 分页查询应付（基地代理只返回授权基地）
#[utoipa::path(
    get,
    path = "/api/payable/list",
    tag = "Payable",
    params(PayableListQuery),
    responses(
        (status = 200, description = "分页结果，附 Link 头"),
        (status = 400, description = "状态或时间格式非法"),
    )
)]
#[actix_web::get("/api/payable/list")]
pub async fn list(
    state: web::Data<AppState>,
    claims: Claims,
    req: HttpRequest,
    query: web::Query<PayableListQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner().into_query()?;
    let scope = AccessScope::from_claims(&claims);
    let paged = list_payables(state.store.as_ref(), &scope, &query).await?;
    let link = build_link_header(req.path(), paged.page, paged.page_size, Some(paged.total));
    Ok(HttpResponse::Ok()
        .insert_header((header::LINK, link))
        .json(ApiResponse::success(paged)))
}

/// 应付详情：关联采购、明细、付款
#[utoipa::path(
    get,
    path = "/api/payable/detail",
    tag = "Payable",
    params(IdQuery),
    responses(
        (status = 200, description = "应付详情"),
        (status = 404, description = "应付不存在"),
    )
)]
#[actix_web::get("/api/payable/detail")]
pub async fn detail(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
) -> AppResult<web::Json<ApiResponse<PayableDetail>>> {
    let scope = AccessScope::from_claims(&claims);
    let detail = payable_detail(state.store.as_ref(), &scope, query.id).await?;
    api_success!(detail)
}

/// 管理员设置应付状态
#[utoipa::path(
    post,
    path = "/api/payable/update-status",
    tag = "Payable",
    params(IdQuery),
    request_body = StatusBody,
    responses(
        (status = 200, description = "更新后的应付"),
        (status = 403, description = "仅管理员"),
    )
)]
#[actix_web::post("/api/payable/update-status")]
pub async fn update_status(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<IdQuery>,
    body: web::Json<StatusBody>,
) -> AppResult<web::Json<ApiResponse<Option<PayableRow>>>> {
    let scope = AccessScope::from_claims(&claims);
    let payable = set_payable_status(
        state.store.as_ref(),
        &state.ledger,
        &scope,
        query.id,
        &body.status,
    )
    .await?;
    api_success!(payable)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list).service(detail).service(update_status);
}
