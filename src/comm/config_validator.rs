use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfiguration {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub mysql_dsn: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: Option<String>,
    pub jwt_ttl_hours: i64,
    pub auth_bypass: bool,
    pub dev_seed_enabled: bool,
    /// 原始字符串，例如 `90` / `90s` / `15m` / `1h`
    pub mv_refresh_interval: Option<String>,
    pub strict_product_supplier: bool,
    pub mutation_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            mysql_dsn: None,
            db_max_connections: 10,
            jwt_secret: None,
            jwt_ttl_hours: 168,
            auth_bypass: false,
            dev_seed_enabled: false,
            mv_refresh_interval: None,
            strict_product_supplier: false,
            mutation_timeout_secs: 5,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl AppConfiguration {
    /// 物化汇总刷新周期；未配置返回 None
    pub fn refresh_interval(&self) -> AppResult<Option<Duration>> {
        match self.mv_refresh_interval.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_duration(raw).map(Some).ok_or_else(|| {
                AppError::bad_request(
                    "config",
                    format!("mv_refresh_interval 无法解析: {}", raw),
                )
            }),
        }
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_secs)
    }
}

/// 解析 `90`、`90s`、`15m`、`1h`；零或非法返回 None
/// Parse `90`, `90s`, `15m`, `1h`. Zero and garbage yield None.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let n: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        _ => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// 验证整个配置；`memory` 为 true 时不要求数据库 DSN
    pub fn validate_config(&self, config: &AppConfiguration, memory: bool) -> AppResult<()> {
        let invalid = |msg: String| Err(AppError::bad_request("config", msg));

        if config.host.trim().is_empty() {
            return invalid("host 不能为空".to_string());
        }
        if config.port == 0 {
            return invalid("port 必须在 1-65535 范围内".to_string());
        }
        if let Some(workers) = config.workers {
            if workers == 0 || workers > 256 {
                return invalid(format!("workers 必须在 1-256 范围内: {}", workers));
            }
        }
        if !memory && config.mysql_dsn.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return invalid("缺少必需配置 MYSQL_DSN".to_string());
        }
        if config.db_max_connections == 0 {
            return invalid("db_max_connections 必须大于 0".to_string());
        }
        if !config.auth_bypass && config.jwt_secret.as_deref().map_or(true, |s| s.is_empty()) {
            return invalid("缺少必需配置 JWT_SECRET".to_string());
        }
        if config.jwt_ttl_hours <= 0 {
            return invalid("jwt_ttl_hours 必须大于 0".to_string());
        }
        if config.mutation_timeout_secs == 0 {
            return invalid("mutation_timeout_secs 必须大于 0".to_string());
        }
        if v::LogFormat::parse(&config.log_format).is_none() {
            return invalid(format!("log_format 只能是 compact 或 json: {}", config.log_format));
        }
        config.refresh_interval()?;
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 环境特定配置加载器
pub struct EnvironmentConfigLoader {
    environment: String,
}

impl EnvironmentConfigLoader {
    /// 创建环境配置加载器
    pub fn new() -> Self {
        let environment = std::env::var("VGO_ENV").unwrap_or_else(|_| "development".to_string());
        Self { environment }
    }

    /// 获取当前环境
    pub fn get_environment(&self) -> &str {
        &self.environment
    }

    /// 获取环境特定的配置文件路径（均为可选）
    pub fn get_config_paths(&self) -> Vec<String> {
        vec![
            "config/default.toml".to_string(),
            format!("config/{}.toml", self.environment),
            "config/local.toml".to_string(),
        ]
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for EnvironmentConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
