/// Base 模块
/// 授权范围、健康检查、登录与运维命令
pub mod scope;
pub mod routes;

#[path = "cmd/cmd.rs"]
pub mod cmd;

pub mod controller {
    pub mod admin {
        pub mod login;
    }
}

/// 注册 base 模块的路由
pub fn register_base_routes() {
    crate::register_route!("base", "健康检查与登录", "base", routes::configure);
}

/// 注册 base 模块的命令
pub fn register_base_commands(registry: &mut crate::command_registry::CommandRegistry) {
    registry.register_module(Box::new(cmd::BaseCommands));
}
