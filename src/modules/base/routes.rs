use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::controller::admin::login;
use crate::app_bootstrap::AppState;
use crate::error::ApiResponse;

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub message: Option<String>,
    pub timestamp: String,
}

/// 健康检查端点（数据库连通性）
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Base",
    responses(
        (status = 200, description = "服务健康", body = HealthResponse),
        (status = 503, description = "数据库不可用", body = HealthResponse),
    )
)]
#[actix_web::get("/api/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let ping = state.store.ping().await;
    let healthy = ping.is_ok();
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        backend: state.store.backend().to_string(),
        message: ping.err().map(|e| v::describe_error(&e)),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let mut payload = ApiResponse::success(body);
    payload.success = healthy;
    if healthy {
        HttpResponse::Ok().json(payload)
    } else {
        HttpResponse::ServiceUnavailable().json(payload)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(login::login)
        .service(login::seed_admin);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::test;
    use serde_json::Value;

    use crate::api::testing::state;
    use crate::store::MemoryStore;
    use crate::test_app;

    #[actix_web::test]
    async fn test_health_reports_backend() {
        let state = state(Arc::new(MemoryStore::new()), false);
        let app = test_app!(state);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["backend"], "memory");
    }
}
