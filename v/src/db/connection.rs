use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};

use crate::db::error::{DbError, Result};
use crate::{HealthCheck, HealthStatus};

/// 连接池参数 / Pool options
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// 构建 MySQL 连接池 / Build MySQL pool
///
/// 接受 `mysql://` URL；Go 风格 DSN（`user:pass@tcp(host:port)/db`）会先被转换
/// Accepts a `mysql://` URL; Go-style DSNs are normalised first.
pub async fn connect_mysql(settings: &PoolSettings) -> Result<Pool<MySql>> {
    let url = normalize_mysql_dsn(&settings.url)?;
    let pool = MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(1)
        .max_lifetime(Some(Duration::from_secs(1800)))
        .idle_timeout(Some(Duration::from_secs(300)))
        .acquire_timeout(settings.acquire_timeout)
        .connect(&url)
        .await
        .map_err(DbError::from)?;
    Ok(pool)
}

/// 将 DSN 统一为 `mysql://` URL / Normalise a DSN into a `mysql://` URL
///
/// 示例 / Example: `root:pw@tcp(127.0.0.1:3306)/backoffice?parseTime=true`
/// -> `mysql://root:pw@127.0.0.1:3306/backoffice`
pub fn normalize_mysql_dsn(dsn: &str) -> Result<String> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(DbError::Config("数据库 DSN 为空 / empty DSN".to_string()));
    }
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return Ok(dsn.to_string());
    }
    let (cred, rest) = dsn
        .rsplit_once('@')
        .ok_or_else(|| DbError::Config(format!("无法解析 DSN: {}", dsn)))?;
    let (user, pass) = cred.split_once(':').unwrap_or((cred, ""));
    let rest = rest.strip_prefix("tcp(").unwrap_or(rest);
    let (addr, db) = rest
        .split_once(")/")
        .or_else(|| rest.split_once('/'))
        .ok_or_else(|| DbError::Config(format!("DSN 缺少数据库名: {}", dsn)))?;
    let db = db.split('?').next().unwrap_or(db);
    let (host, port) = addr.split_once(':').unwrap_or((addr, "3306"));
    Ok(build_mysql_url(host, port, user, pass, db))
}

/// 构建 MySQL 连接 URL / Build MySQL URL
pub fn build_mysql_url(host: &str, port: &str, user: &str, pass: &str, name: &str) -> String {
    let enc_user = urlencoding::encode(user);
    let enc_pass = urlencoding::encode(pass);
    format!(
        "mysql://{}:{}@{}:{}/{}",
        enc_user, enc_pass, host, port, name
    )
}

/// 为 MySQL 连接池实现通用健康检查接口
/// Implement generic HealthCheck interface for MySQL pool
#[async_trait]
impl HealthCheck for Pool<MySql> {
    async fn check_health(&self) -> HealthStatus {
        let res = sqlx::query("SELECT 1").execute(self).await;
        match res {
            Ok(_) => HealthStatus {
                component: "mysql_pool".to_string(),
                healthy: true,
                message: Some("OK".to_string()),
                timestamp: chrono::Utc::now(),
            },
            Err(e) => HealthStatus {
                component: "mysql_pool".to_string(),
                healthy: false,
                message: Some(format!("SQLx error: {}", e)),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}
