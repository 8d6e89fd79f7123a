use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches, Command};

/// 命令注册器 trait，各模块实现此 trait 来注册命令
#[async_trait]
pub trait CommandModule: Send + Sync {
    /// 获取模块名称
    fn module_name(&self) -> &'static str;

    /// 注册模块的子命令
    fn register_commands(&self) -> Vec<Command>;

    /// 处理模块命令
    async fn handle_command(&self, command_name: &str, matches: &ArgMatches) -> anyhow::Result<()>;
}

/// 命令注册器
#[derive(Default)]
pub struct CommandRegistry {
    modules: Vec<Box<dyn CommandModule>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块（同名模块覆盖）
    pub fn register_module(&mut self, module: Box<dyn CommandModule>) {
        self.modules
            .retain(|m| m.module_name() != module.module_name());
        self.modules.push(module);
    }

    /// 构建完整的命令行应用
    pub fn build_app(&self) -> Command {
        let mut app = Command::new(env!("CARGO_PKG_NAME"))
            .version(env!("CARGO_PKG_VERSION"))
            .about("多基地后台应付账款与结算服务")
            .subcommand_required(true)
            .arg_required_else_help(true);

        // 内置 server 命令
        app = app.subcommand(
            Command::new("server")
                .about("启动 Web 服务器")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("HOST")
                        .help("覆盖配置中的监听地址"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("覆盖配置中的监听端口")
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("WORKERS")
                        .help("设置工作线程数")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("memory")
                        .long("memory")
                        .help("使用进程内存储（开发/演示）")
                        .action(ArgAction::SetTrue),
                ),
        );

        // 内置 version 命令
        app = app.subcommand(Command::new("version").about("显示版本信息"));

        for module in &self.modules {
            for command in module.register_commands() {
                app = app.subcommand(command);
            }
        }

        app
    }

    fn owner_of(&self, command_name: &str) -> Option<&dyn CommandModule> {
        self.modules
            .iter()
            .find(|m| {
                m.register_commands()
                    .iter()
                    .any(|c| c.get_name() == command_name)
            })
            .map(|m| m.as_ref())
    }

    /// 分派到注册了该命令的模块
    pub async fn handle_command(&self, command_name: &str, matches: &ArgMatches) -> anyhow::Result<()> {
        match self.owner_of(command_name) {
            Some(module) => module.handle_command(command_name, matches).await,
            None => anyhow::bail!("未找到处理命令 '{}' 的模块", command_name),
        }
    }

    /// 获取所有注册的模块名称
    pub fn get_registered_modules(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.module_name()).collect()
    }
}

/// 输出版本信息
pub fn handle_version_command() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl CommandModule for Echo {
        fn module_name(&self) -> &'static str {
            "echo"
        }

        fn register_commands(&self) -> Vec<Command> {
            vec![Command::new("echo").arg(Arg::new("word").long("word").required(true))]
        }

        async fn handle_command(&self, _: &str, matches: &ArgMatches) -> anyhow::Result<()> {
            match matches.get_one::<String>("word").map(String::as_str) {
                Some("ok") => Ok(()),
                other => anyhow::bail!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_module() {
        let mut registry = CommandRegistry::new();
        registry.register_module(Box::new(Echo));
        registry.register_module(Box::new(Echo));
        assert_eq!(registry.get_registered_modules(), vec!["echo"]);

        let matches = registry
            .build_app()
            .try_get_matches_from(["bin", "echo", "--word", "ok"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        registry.handle_command(name, sub).await.unwrap();

        assert!(registry.handle_command("nope", sub).await.is_err());
    }

    #[test]
    fn test_server_flags() {
        let matches = CommandRegistry::new()
            .build_app()
            .try_get_matches_from(["bin", "server", "--port", "9000", "--memory"])
            .unwrap();
        let sub = matches.subcommand_matches("server").unwrap();
        assert_eq!(sub.get_one::<u16>("port"), Some(&9000));
        assert!(sub.get_flag("memory"));
        assert!(sub.get_one::<String>("host").is_none());
    }
}
