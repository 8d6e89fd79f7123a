use config::FileFormat;
use tracing::{debug, info};
use v::{ConfigError, ConfigManager, ConfigSource};

use crate::comm::config_validator::{AppConfiguration, ConfigValidator, EnvironmentConfigLoader};
use crate::error::{AppError, AppResult};

/// 增强的配置管理器：分层加载 + 类型化 + 校验
/// Layered config (files, then plain env vars) loaded into `AppConfiguration` and validated.
pub struct EnhancedConfigManager {
    config_manager: ConfigManager,
    env_loader: EnvironmentConfigLoader,
    app_config: AppConfiguration,
}

impl EnhancedConfigManager {
    /// 按 default -> {VGO_ENV} -> local -> 环境变量 的顺序加载
    pub fn new(memory: bool) -> AppResult<Self> {
        let env_loader = EnvironmentConfigLoader::new();
        info!(environment = env_loader.get_environment(), "loading configuration");

        let mut sources: Vec<ConfigSource> = env_loader
            .get_config_paths()
            .into_iter()
            .map(|path| ConfigSource::File {
                path,
                format: Some(FileFormat::Toml),
                required: false,
            })
            .collect();
        // 环境变量不带前缀：MYSQL_DSN -> mysql_dsn
        sources.push(ConfigSource::Env { prefix: None });

        Self::from_sources(sources, env_loader, memory)
    }

    pub fn from_sources(
        sources: Vec<ConfigSource>,
        env_loader: EnvironmentConfigLoader,
        memory: bool,
    ) -> AppResult<Self> {
        let config_manager = ConfigManager::with_sources(sources).map_err(|e| {
            AppError::Config(ConfigError::InitializationError {
                message: e.to_string(),
            })
        })?;
        let app_config = Self::load_app_config(&config_manager)?;
        ConfigValidator::new().validate_config(&app_config, memory)?;
        info!("配置加载和验证成功");
        debug!(?app_config, "application configuration");

        Ok(Self {
            config_manager,
            env_loader,
            app_config,
        })
    }

    fn load_app_config(cm: &ConfigManager) -> AppResult<AppConfiguration> {
        let defaults = AppConfiguration::default();
        Ok(AppConfiguration {
            host: cm.get_opt("host")?.unwrap_or(defaults.host),
            port: cm.get_opt("port")?.unwrap_or(defaults.port),
            workers: cm.get_opt("workers")?,
            mysql_dsn: cm.get_opt("mysql_dsn")?,
            db_max_connections: cm
                .get_opt("db_max_connections")?
                .unwrap_or(defaults.db_max_connections),
            jwt_secret: cm.get_opt("jwt_secret")?,
            jwt_ttl_hours: cm.get_opt("jwt_ttl_hours")?.unwrap_or(defaults.jwt_ttl_hours),
            auth_bypass: cm.get_opt("auth_bypass")?.unwrap_or(defaults.auth_bypass),
            dev_seed_enabled: cm
                .get_opt("dev_seed_enabled")?
                .unwrap_or(defaults.dev_seed_enabled),
            mv_refresh_interval: cm
                .get_opt::<serde_json::Value>("mv_refresh_interval")?
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            strict_product_supplier: cm
                .get_opt("strict_product_supplier")?
                .unwrap_or(defaults.strict_product_supplier),
            mutation_timeout_secs: cm
                .get_opt("mutation_timeout_secs")?
                .unwrap_or(defaults.mutation_timeout_secs),
            log_level: cm.get_opt("log_level")?.unwrap_or(defaults.log_level),
            log_format: cm.get_opt("log_format")?.unwrap_or(defaults.log_format),
        })
    }

    /// 获取应用配置
    pub fn get_app_config(&self) -> &AppConfiguration {
        &self.app_config
    }

    pub fn into_app_config(self) -> AppConfiguration {
        self.app_config
    }

    /// 输出配置摘要（密钥与 DSN 不落日志）
    pub fn print_config_summary(&self) {
        self.config_manager.log_sources_info();
        let c = &self.app_config;
        info!(
            environment = self.env_loader.get_environment(),
            production = self.env_loader.is_production(),
            host = %c.host,
            port = c.port,
            workers = ?c.workers,
            mysql_configured = c.mysql_dsn.is_some(),
            jwt_ttl_hours = c.jwt_ttl_hours,
            auth_bypass = c.auth_bypass,
            dev_seed_enabled = c.dev_seed_enabled,
            mv_refresh_interval = ?c.mv_refresh_interval,
            strict_product_supplier = c.strict_product_supplier,
            "configuration summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn toml(content: &str) -> ConfigSource {
        ConfigSource::String {
            content: content.to_string(),
            format: FileFormat::Toml,
        }
    }

    #[test]
    fn test_layers_and_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("port".to_string(), serde_json::json!(9090));
        let manager = EnhancedConfigManager::from_sources(
            vec![
                toml("mysql_dsn = \"mysql://u:p@h/db\"\njwt_secret = \"k\"\nport = 8081\nmv_refresh_interval = \"15m\""),
                ConfigSource::Memory(overrides),
            ],
            EnvironmentConfigLoader::new(),
            false,
        )
        .unwrap();
        let c = manager.get_app_config();
        assert_eq!(c.port, 9090);
        assert_eq!(c.jwt_ttl_hours, 168);
        assert_eq!(c.db_max_connections, 10);
        assert_eq!(
            c.refresh_interval().unwrap(),
            Some(std::time::Duration::from_secs(900))
        );
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let result = EnhancedConfigManager::from_sources(
            vec![toml("mysql_dsn = \"mysql://u:p@h/db\"")],
            EnvironmentConfigLoader::new(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_numeric_refresh_interval_accepted() {
        let manager = EnhancedConfigManager::from_sources(
            vec![toml("auth_bypass = true\nmv_refresh_interval = 90")],
            EnvironmentConfigLoader::new(),
            true,
        )
        .unwrap();
        assert_eq!(
            manager.get_app_config().refresh_interval().unwrap(),
            Some(std::time::Duration::from_secs(90))
        );
    }
}
