//! HTTP 测试共用装配
use std::sync::Arc;

use actix_web::web;

use crate::app_bootstrap::AppState;
use crate::comm::config_validator::AppConfiguration;
use crate::store::{MemoryStore, Store};

pub const TEST_SECRET: &str = "test-secret";

/// 基于内存存储的共享状态；`auth_bypass` 为 false 时需要携带令牌
pub fn state(store: Arc<MemoryStore>, auth_bypass: bool) -> web::Data<AppState> {
    let config = AppConfiguration {
        jwt_secret: Some(TEST_SECRET.to_string()),
        auth_bypass,
        dev_seed_enabled: true,
        ..Default::default()
    };
    let store: Arc<dyn Store> = store;
    web::Data::new(AppState::from_config(&config, store))
}

/// 为指定角色签发 Bearer 头
pub fn bearer(state: &AppState, role: &str, bases: &[&str]) -> (String, String) {
    let (token, _) = state
        .signer
        .issue(1, role, bases.iter().map(|b| b.to_string()).collect())
        .unwrap();
    ("Authorization".to_string(), format!("Bearer {}", token))
}

/// 构建挂载全部路由的测试服务
#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($state.clone())
                .configure($crate::app_bootstrap::configure_api),
        )
        .await
    };
}
