pub mod api;
pub mod auth;
pub mod comm;
pub mod error;
#[path = "bootstrap/app_bootstrap.rs"]
pub mod app_bootstrap;
#[path = "bootstrap/command_registry.rs"]
pub mod command_registry;
#[path = "bootstrap/route_registry.rs"]
pub mod route_registry;
pub mod store;

// Modules
pub mod modules;

/// 初始化所有模块的命令
pub fn init_commands() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    modules::base::register_base_commands(&mut registry);
    modules::rollup::register_rollup_commands(&mut registry);
    registry
}

/// 初始化所有模块的路由（重复调用按名称覆盖）
pub fn init_routes() {
    modules::base::register_base_routes();
    modules::purchase::register_purchase_routes();
    modules::payable::register_payable_routes();
    modules::payment::register_payment_routes();
    modules::rollup::register_rollup_routes();
}

// Re-export bootstrap modules
pub use app_bootstrap::*;
pub use command_registry::*;
pub use route_registry::*;
