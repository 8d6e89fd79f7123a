/// 月度物化汇总模块
pub mod cmd;
pub mod refresher;
pub mod routes;

/// 注册汇总模块的路由
pub fn register_rollup_routes() {
    crate::register_route!(
        "rollup.admin",
        "月度汇总重建接口",
        "rollup",
        routes::configure
    );
}

pub fn register_rollup_commands(registry: &mut crate::command_registry::CommandRegistry) {
    registry.register_module(Box::new(cmd::RollupCommands));
}
