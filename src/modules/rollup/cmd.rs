use async_trait::async_trait;
use clap::{Arg, ArgGroup, ArgMatches, Command};

use super::refresher::{recompute_monthly, recompute_range, MonthRefresh};
use crate::app_bootstrap::{load_configuration, open_store};
use crate::command_registry::CommandModule;

/// 汇总模块的命令处理器
pub struct RollupCommands;

fn print_refresh(r: &MonthRefresh) {
    println!(
        "{}: supplier_rows={} expense_rows={}",
        r.month, r.counts.supplier_rows, r.counts.expense_rows
    );
}

#[async_trait]
impl CommandModule for RollupCommands {
    fn module_name(&self) -> &'static str {
        "rollup"
    }

    fn register_commands(&self) -> Vec<Command> {
        vec![Command::new("refresh-monthly")
            .about("重建月度物化汇总")
            .arg(
                Arg::new("month")
                    .long("month")
                    .value_name("YYYY-MM")
                    .help("单月"),
            )
            .arg(
                Arg::new("start")
                    .long("start")
                    .value_name("YYYY-MM")
                    .requires("end")
                    .help("区间起点"),
            )
            .arg(
                Arg::new("end")
                    .long("end")
                    .value_name("YYYY-MM")
                    .requires("start")
                    .help("区间终点（含）"),
            )
            .group(
                ArgGroup::new("period")
                    .args(["month", "start"])
                    .required(true),
            )]
    }

    async fn handle_command(&self, command_name: &str, matches: &ArgMatches) -> anyhow::Result<()> {
        if command_name != "refresh-monthly" {
            anyhow::bail!("未知命令: {}", command_name);
        }
        let config = load_configuration(false)?;
        let store = open_store(&config, false).await?;

        if let Some(month) = matches.get_one::<String>("month") {
            print_refresh(&recompute_monthly(store.as_ref(), month).await?);
            return Ok(());
        }
        let (Some(start), Some(end)) = (
            matches.get_one::<String>("start"),
            matches.get_one::<String>("end"),
        ) else {
            anyhow::bail!("需要 --month 或 --start/--end");
        };
        for refreshed in recompute_range(store.as_ref(), start, end).await? {
            print_refresh(&refreshed);
        }
        Ok(())
    }
}
