use actix_web::web;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api_success;
use crate::app_bootstrap::AppState;
use crate::auth::{hash_password, verify_password};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::modules::base::scope::ROLE_ADMIN;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::modules::tx::finish;
use crate::store::{NewUser, Store, StoreTx, UserRow};

/// 登录请求结构体
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录用户信息
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub bases: Vec<String>,
}

/// 登录响应结构体
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// YYYY-MM-DD HH:MM:SS（服务器本地时区）
    pub expires_at: String,
    pub user: LoginUser,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SeedAdminRequest {
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeedAdminResponse {
    pub user_id: i64,
    pub created: bool,
}

async fn find_user(store: &dyn Store, username: &str) -> ServiceResult<Option<UserRow>> {
    let mut tx = store.begin().await?;
    let result = tx.find_user(username).await.map_err(ServiceError::from);
    finish(tx, result).await
}

async fn seed_in_tx(
    tx: &mut dyn StoreTx,
    username: &str,
    password_hash: String,
) -> ServiceResult<SeedAdminResponse> {
    if let Some(user) = tx.find_user(username).await? {
        return Ok(SeedAdminResponse {
            user_id: user.id,
            created: false,
        });
    }
    let user_id = tx
        .insert_user(&NewUser {
            username: username.to_string(),
            password_hash,
            role: ROLE_ADMIN.to_string(),
            bases: String::new(),
        })
        .await?;
    info!(user_id, username, "admin user seeded");
    Ok(SeedAdminResponse {
        user_id,
        created: true,
    })
}

/// 用户登录，签发 Bearer 令牌
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "登录成功", body = LoginResponse),
        (status = 401, description = "用户名或密码错误"),
    )
)]
#[actix_web::post("/api/login")]
pub async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> AppResult<web::Json<ApiResponse<LoginResponse>>> {
    let username = req.username.trim();
    let user = find_user(state.store.as_ref(), username)
        .await?
        .filter(|u| verify_password(&req.password, &u.password_hash))
        .ok_or_else(|| AppError::unauthorized("用户名或密码错误"))?;

    let (token, claims) = state.signer.issue(user.id, &user.role, user.base_names())?;
    let expires_at = DateTime::from_timestamp(claims.exp, 0)
        .map(|dt| {
            crate::comm::serde_fmt::format_datetime(&dt.with_timezone(&chrono::Local).naive_local())
        })
        .unwrap_or_default();
    info!(uid = user.id, role = %user.role, "user logged in");

    api_success!(LoginResponse {
        token,
        expires_at,
        user: LoginUser {
            id: user.id,
            username: user.username,
            role: claims.role,
            bases: claims.bases,
        },
    })
}

/// 开发环境：创建管理员账户（已存在则直接返回）
#[utoipa::path(
    post,
    path = "/api/dev/seed-admin",
    tag = "Auth",
    request_body = SeedAdminRequest,
    responses(
        (status = 200, description = "管理员账户", body = SeedAdminResponse),
        (status = 404, description = "未开启 DEV_SEED_ENABLED"),
    )
)]
#[actix_web::post("/api/dev/seed-admin")]
pub async fn seed_admin(
    state: web::Data<AppState>,
    req: web::Json<SeedAdminRequest>,
) -> AppResult<web::Json<ApiResponse<SeedAdminResponse>>> {
    if !state.dev_seed_enabled {
        return Err(AppError::not_found("not-found", "接口不存在"));
    }
    let username = req
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("admin");
    if req.password.is_empty() {
        return Err(AppError::bad_request("bad-request", "password 不能为空"));
    }

    let password_hash = hash_password(&req.password)?;

    let mut tx = state.store.begin().await.map_err(ServiceError::from)?;
    let result = seed_in_tx(tx.as_mut(), username, password_hash).await;
    let seeded = finish(tx, result).await?;
    api_success!(seeded)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{json, Value};

    use crate::api::testing::state;
    use crate::store::MemoryStore;
    use crate::test_app;

    #[actix_web::test]
    async fn test_seed_then_login() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store, false);
        let app = test_app!(state);

        let seed = || {
            test::TestRequest::post()
                .uri("/api/dev/seed-admin")
                .set_json(json!({"password": "pa55"}))
                .to_request()
        };
        let first: Value = test::call_and_read_body_json(&app, seed()).await;
        assert_eq!(first["data"]["created"], true);
        let second: Value = test::call_and_read_body_json(&app, seed()).await;
        assert_eq!(second["data"]["created"], false);
        assert_eq!(first["data"]["user_id"], second["data"]["user_id"]);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/login")
                .set_json(json!({"username": "admin", "password": "wrong"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/login")
                .set_json(json!({"username": "admin", "password": "pa55"}))
                .to_request(),
        )
        .await;
        assert_eq!(body["data"]["user"]["role"], "admin");
        let token = body["data"]["token"].as_str().unwrap().to_string();
        assert_eq!(state.signer.verify(&token).unwrap().role, "admin");

        // 令牌可直接用于受保护接口
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/payable/list")
                .insert_header(("Authorization", format!("Bearer {}", token)))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_seed_disabled_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let state = state(store, true);
        // 关闭开发种子接口
        let state = actix_web::web::Data::new(crate::app_bootstrap::AppState {
            store: state.store.clone(),
            ledger: state.ledger.clone(),
            signer: state.signer.clone(),
            auth_bypass: true,
            dev_seed_enabled: false,
        });
        let app = test_app!(state);
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/dev/seed-admin")
                .set_json(json!({"password": "pa55"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
