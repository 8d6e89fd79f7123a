use actix_web::web;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

/// 路由配置函数类型
pub type RouteConfigFn = fn(&mut web::ServiceConfig);

/// 路由信息结构
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub name: String,
    pub description: String,
    pub module: String,
    pub config_fn: RouteConfigFn,
}

/// 全局路由注册器（按名称有序，重复注册覆盖）
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, RouteInfo>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由
    pub fn register_route(&mut self, route_info: RouteInfo) {
        self.routes.insert(route_info.name.clone(), route_info);
    }

    /// 获取指定模块的路由
    pub fn get_routes_by_module(&self, module: &str) -> Vec<&RouteInfo> {
        self.routes
            .values()
            .filter(|route| route.module == module)
            .collect()
    }

    /// 配置所有路由到 ServiceConfig
    pub fn configure_all_routes(&self, cfg: &mut web::ServiceConfig) {
        for route_info in self.routes.values() {
            (route_info.config_fn)(cfg);
        }
    }

    fn modules(&self) -> BTreeSet<&str> {
        self.routes.values().map(|r| r.module.as_str()).collect()
    }

    /// 获取路由统计信息：(总数, 模块列表)
    pub fn get_stats(&self) -> (usize, Vec<String>) {
        (
            self.routes.len(),
            self.modules().into_iter().map(str::to_string).collect(),
        )
    }

    /// 记录路由注册信息
    pub fn log_routes_info(&self) {
        for module in self.modules() {
            for route in self.get_routes_by_module(module) {
                info!(module, route = %route.name, description = %route.description, "route registered");
            }
        }
        info!(total = self.routes.len(), "routes registered");
    }
}

lazy_static! {
    static ref GLOBAL_ROUTE_REGISTRY: RwLock<RouteRegistry> = RwLock::new(RouteRegistry::new());
}

// 注册表只保存函数指针，锁中毒后数据依旧可用
fn read_registry() -> RwLockReadGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_registry() -> RwLockWriteGuard<'static, RouteRegistry> {
    GLOBAL_ROUTE_REGISTRY
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 注册路由到全局注册器
pub fn register_global_route(route_info: RouteInfo) {
    write_registry().register_route(route_info);
}

/// 配置所有全局路由
pub fn configure_global_routes(cfg: &mut web::ServiceConfig) {
    read_registry().configure_all_routes(cfg);
}

pub fn log_global_routes_info() {
    read_registry().log_routes_info();
}

/// 便捷宏：注册路由
#[macro_export]
macro_rules! register_route {
    ($name:expr, $description:expr, $module:expr, $config_fn:expr) => {
        $crate::route_registry::register_global_route($crate::route_registry::RouteInfo {
            name: $name.to_string(),
            description: $description.to_string(),
            module: $module.to_string(),
            config_fn: $config_fn,
        });
    };
}
