use actix_web::web;
use serde::Deserialize;
use utoipa::IntoParams;

use super::refresher::{recompute_monthly, recompute_range, MonthRefresh};
use crate::api_success;
use crate::app_bootstrap::AppState;
use crate::auth::Claims;
use crate::error::{ApiResponse, AppResult};
use crate::modules::base::scope::AccessScope;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    /// YYYY-MM
    pub month: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    /// YYYY-MM
    pub start: String,
    /// YYYY-MM（含）
    pub end: String,
}

/// 重建单月汇总
#[utoipa::path(
    post,
    path = "/api/admin/refresh-monthly",
    tag = "Admin",
    params(MonthQuery),
    responses(
        (status = 200, description = "重建行数", body = MonthRefresh),
        (status = 403, description = "仅管理员"),
    )
)]
#[actix_web::post("/api/admin/refresh-monthly")]
pub async fn refresh_monthly(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<MonthQuery>,
) -> AppResult<web::Json<ApiResponse<MonthRefresh>>> {
    AccessScope::from_claims(&claims).require_admin()?;
    let refreshed = recompute_monthly(state.store.as_ref(), &query.month).await?;
    api_success!(refreshed)
}

/// 按月重建闭区间汇总
#[utoipa::path(
    post,
    path = "/api/admin/refresh-monthly-range",
    tag = "Admin",
    params(RangeQuery),
    responses(
        (status = 200, description = "逐月重建行数", body = [MonthRefresh]),
        (status = 400, description = "区间非法"),
    )
)]
#[actix_web::post("/api/admin/refresh-monthly-range")]
pub async fn refresh_monthly_range(
    state: web::Data<AppState>,
    claims: Claims,
    query: web::Query<RangeQuery>,
) -> AppResult<web::Json<ApiResponse<Vec<MonthRefresh>>>> {
    AccessScope::from_claims(&claims).require_admin()?;
    let refreshed = recompute_range(state.store.as_ref(), &query.start, &query.end).await?;
    api_success!(refreshed)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(refresh_monthly).service(refresh_monthly_range);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::test;
    use chrono::NaiveDate;
    use serde_json::Value;

    use crate::api::testing::{bearer, state};
    use crate::store::MemoryStore;
    use crate::test_app;

    #[actix_web::test]
    async fn test_refresh_endpoints() {
        let store = Arc::new(MemoryStore::new());
        let base = store.add_base("Vientiane", "VTE", "CNY").await;
        store
            .add_expense(base, NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(), 42.0)
            .await;
        let state = state(store.clone(), false);
        let app = test_app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/admin/refresh-monthly?month=2025-02")
                .insert_header(bearer(&state, "base_agent", &["Vientiane"]))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let admin = bearer(&state, "admin", &[]);
        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/admin/refresh-monthly?month=2025-02")
                .insert_header(admin.clone())
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["month"], "2025-02");
        assert_eq!(body["data"]["expense_rows"], 1);
        assert_eq!(store.base_expense_month("2025-02").await[0].total_amount, 42.0);

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/admin/refresh-monthly-range?start=2025-01&end=2025-03")
                .insert_header(admin.clone())
                .to_request(),
        )
        .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/admin/refresh-monthly?month=Feb")
                .insert_header(admin)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
