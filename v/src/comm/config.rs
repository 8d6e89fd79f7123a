use anyhow::{anyhow, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置项 '{key}' 不存在")]
    KeyNotFound { key: String },
    #[error("配置项 '{key}' 类型转换失败: {message}")]
    TypeConversionError { key: String, message: String },
    #[error("配置项 '{key}' 取值非法: {message}")]
    InvalidValue { key: String, message: String },
    #[error("配置初始化失败: {message}")]
    InitializationError { message: String },
}

/// 配置数据源信息
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置管理器
///
/// 数据源按添加顺序叠加，后添加者优先生效。
/// Sources are layered in insertion order; later sources win.
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 使用指定的配置源创建配置管理器
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        for (idx, source) in sources.into_iter().enumerate() {
            let priority = (idx + 1) as u8;
            let info = source.get_source_info(priority);

            // 可选文件不存在时跳过，必需文件不存在直接报错
            if let ConfigSource::File { path, required, .. } = &source {
                let exists = std::path::Path::new(path).exists();
                if !exists && *required {
                    return Err(anyhow!("必需的配置文件不存在: {}", path));
                }
                if !exists {
                    sources_info.push(info);
                    continue;
                }
            }

            builder = source
                .add_to_builder(builder)
                .map_err(|e| anyhow!("添加配置源失败: {}", e))?;
            sources_info.push(ConfigSourceInfo {
                loaded: true,
                ..info
            });
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("构建配置失败: {}", e))?;
        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 获取可选配置值：缺失返回 None，类型错误返回 Err
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> std::result::Result<Option<T>, ConfigError> {
        if !self.exists(key) {
            return Ok(None);
        }
        self.config
            .get(key)
            .map(Some)
            .map_err(|e| ConfigError::TypeConversionError {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// 检查配置项是否存在
    pub fn exists(&self, key: &str) -> bool {
        self.config.get::<serde_json::Value>(key).is_ok()
    }

    /// 获取所有配置源信息
    pub fn get_sources_info(&self) -> &[ConfigSourceInfo] {
        &self.sources_info
    }

    /// 输出配置源详细信息（写入日志）
    pub fn log_sources_info(&self) {
        for info in &self.sources_info {
            tracing::info!(
                source = %info.source_type,
                priority = info.priority,
                loaded = info.loaded,
                "{}",
                info.description
            );
        }
    }

    /// 验证必需的配置项
    pub fn validate_required_keys(
        &self,
        required_keys: &[&str],
    ) -> std::result::Result<(), ConfigError> {
        for key in required_keys {
            if !self.exists(key) {
                return Err(ConfigError::KeyNotFound {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// 配置源类型
pub enum ConfigSource {
    /// 文件配置源
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源；prefix 为 None 时读取不带前缀的变量（MYSQL_DSN -> mysql_dsn）
    Env { prefix: Option<String> },
    /// 内存配置源（HashMap）
    Memory(HashMap<String, serde_json::Value>),
    /// 字符串配置源
    String { content: String, format: FileFormat },
}

impl ConfigSource {
    /// 获取配置源信息
    pub fn get_source_info(&self, priority: u8) -> ConfigSourceInfo {
        let (source_type, description) = match self {
            ConfigSource::File { path, required, .. } => (
                "File",
                format!("文件配置源: {} (必需: {})", path, required),
            ),
            ConfigSource::Env { prefix } => (
                "Environment",
                format!(
                    "环境变量配置源: 前缀={}",
                    prefix.as_deref().unwrap_or("<none>")
                ),
            ),
            ConfigSource::Memory(map) => ("Memory", format!("内存配置源: {} 个配置项", map.len())),
            ConfigSource::String { .. } => ("String", "字符串配置源".to_string()),
        };
        ConfigSourceInfo {
            source_type: source_type.to_string(),
            description,
            priority,
            loaded: false,
        }
    }

    pub fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                Ok(builder.add_source(file_source.required(required)))
            }
            ConfigSource::Env { prefix } => {
                let env = match prefix {
                    Some(p) => Environment::with_prefix(&p).prefix_separator("_"),
                    None => Environment::default(),
                };
                Ok(builder.add_source(env.try_parsing(true).ignore_empty(true)))
            }
            ConfigSource::Memory(map) => {
                let json_content = serde_json::to_string(&map)
                    .map_err(|e| anyhow!("序列化内存配置失败: {}", e))?;
                Ok(builder.add_source(File::from_str(&json_content, FileFormat::Json)))
            }
            ConfigSource::String { content, format } => {
                Ok(builder.add_source(File::from_str(&content, format)))
            }
        }
    }
}
