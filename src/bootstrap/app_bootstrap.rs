use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info, instrument};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use v::{connect_mysql, PoolSettings};

use crate::auth::TokenSigner;
use crate::comm::config_validator::AppConfiguration;
use crate::comm::enhanced_config::EnhancedConfigManager;
use crate::error::{json_error_handler, query_error_handler, AppError, AppResult};
use crate::modules::error::ServiceError;
use crate::modules::rollup::refresher::spawn_refresher;
use crate::modules::tx::LedgerSettings;
use crate::route_registry::configure_global_routes;
use crate::store::{MemoryStore, MySqlStore, Store};

pub const SERVICE_NAME: &str = "vgo-backoffice";

/// 应用配置结构体（监听参数）
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

/// 请求处理共享状态 / State shared by every handler
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: LedgerSettings,
    pub signer: TokenSigner,
    pub auth_bypass: bool,
    pub dev_seed_enabled: bool,
}

impl AppState {
    pub fn from_config(config: &AppConfiguration, store: Arc<dyn Store>) -> Self {
        Self {
            store,
            ledger: LedgerSettings {
                strict_product_supplier: config.strict_product_supplier,
                mutation_timeout: config.mutation_timeout(),
            },
            signer: TokenSigner::new(
                config.jwt_secret.as_deref().unwrap_or_default(),
                config.jwt_ttl_hours,
            ),
            auth_bypass: config.auth_bypass,
            dev_seed_enabled: config.dev_seed_enabled,
        }
    }
}

/// 加载分层配置并初始化日志；CLI 的每个子命令都从这里开始
/// Load layered config, then install the tracing subscriber it describes.
pub fn load_configuration(memory: bool) -> anyhow::Result<AppConfiguration> {
    let manager = EnhancedConfigManager::new(memory)?;
    let config = manager.get_app_config();
    let format = v::LogFormat::parse(&config.log_format).unwrap_or(v::LogFormat::Compact);
    v::init_tracing(SERVICE_NAME, &config.log_level, format)?;
    manager.print_config_summary();
    Ok(manager.into_app_config())
}

/// 打开存储并建表；`memory` 为 true 时使用进程内存储
/// Open the store and run the idempotent schema bootstrap.
pub async fn open_store(config: &AppConfiguration, memory: bool) -> AppResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = if memory {
        info!("using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let dsn = config
            .mysql_dsn
            .as_deref()
            .ok_or_else(|| AppError::internal("缺少 MYSQL_DSN"))?;
        let mut settings = PoolSettings::new(dsn);
        settings.max_connections = config.db_max_connections;
        let pool = connect_mysql(&settings)
            .await
            .map_err(|e| AppError::from(ServiceError::from(e)))?;
        info!(max_connections = settings.max_connections, "mysql pool ready");
        Arc::new(MySqlStore::new(pool))
    };
    store
        .migrate()
        .await
        .map_err(|e| AppError::from(ServiceError::from(e)))?;
    info!(backend = store.backend(), "schema ready");
    Ok(store)
}

/// 注册 JSON / 查询串错误处理以及全部模块路由
/// Body/query error handlers plus every registered module route.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    crate::init_routes();
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler));
    configure_global_routes(cfg);
}

/// 应用启动器
pub struct AppBootstrap {
    config: AppConfig,
}

impl AppBootstrap {
    /// 创建新的应用启动器
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// 设置配置
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// 运行应用服务器
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    pub async fn run(self, app_config: AppConfiguration, memory: bool) -> AppResult<()> {
        info!(config = ?self.config, "启动应用服务器");

        let store = open_store(&app_config, memory).await?;

        if let Some(every) = app_config.refresh_interval()? {
            spawn_refresher(store.clone(), every);
        }

        let state = web::Data::new(AppState::from_config(&app_config, store));
        if state.auth_bypass {
            tracing::warn!("AUTH_BYPASS 已开启，所有请求按管理员处理");
        }

        match self.start_http_server(state).await {
            Ok(()) => {
                info!("服务器已停止");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "服务器启动失败");
                Err(e)
            }
        }
    }

    /// 启动HTTP服务器
    async fn start_http_server(&self, state: web::Data<AppState>) -> AppResult<()> {
        let mut server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(state.clone())
                // 集成 Swagger UI 文档（使用通配路径以兼容静态资源与尾随斜杠）
                .service(SwaggerUi::new("/swagger-ui/{_:.*}").url(
                    "/api-doc/openapi.json",
                    crate::api::swagger::ApiDoc::openapi(),
                ))
                .configure(configure_api)
        });
        if let Some(workers) = self.config.workers {
            server = server.workers(workers);
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(%addr, "listening");
        server
            .bind(&addr)
            .map_err(|e| AppError::internal(format!("绑定 {} 失败: {}", addr, e)))?
            .run()
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;

        Ok(())
    }
}

impl Default for AppBootstrap {
    fn default() -> Self {
        Self::new()
    }
}
