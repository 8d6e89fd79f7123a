use async_trait::async_trait;
use clap::{ArgMatches, Command};

use crate::app_bootstrap::{load_configuration, open_store};
use crate::command_registry::CommandModule;

/// Base 模块的命令处理器
pub struct BaseCommands;

#[async_trait]
impl CommandModule for BaseCommands {
    fn module_name(&self) -> &'static str {
        "base"
    }

    fn register_commands(&self) -> Vec<Command> {
        vec![Command::new("migrate").about("创建或补齐数据库表结构（可重复执行）")]
    }

    async fn handle_command(&self, command_name: &str, _matches: &ArgMatches) -> anyhow::Result<()> {
        match command_name {
            "migrate" => {
                let config = load_configuration(false)?;
                // open_store 内部执行建表
                let store = open_store(&config, false).await?;
                println!("数据库表结构已就绪 ({})", store.backend());
                Ok(())
            }
            _ => anyhow::bail!("未知命令: {}", command_name),
        }
    }
}
