use clap::ArgMatches;

use vgo_backoffice::{
    handle_version_command, init_commands, load_configuration, log_global_routes_info, AppBootstrap,
    AppConfig,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let registry = init_commands();
    let matches: ArgMatches = registry.build_app().get_matches();

    match matches.subcommand() {
        Some(("server", sub_matches)) => {
            if let Err(e) = handle_server_command(sub_matches).await {
                eprintln!("服务启动失败: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(("version", _)) => {
            handle_version_command();
        }
        Some((command_name, sub_matches)) => {
            if let Err(e) = registry.handle_command(command_name, sub_matches).await {
                eprintln!("处理命令 '{}' 时出错: {:#}", command_name, e);
                std::process::exit(1);
            }
        }
        None => {
            // subcommand_required(true) 下不会走到这里
            eprintln!("未知命令，请使用 --help 查看可用命令");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn handle_server_command(matches: &ArgMatches) -> anyhow::Result<()> {
    let memory = matches.get_flag("memory");
    let app_config = load_configuration(memory)?;

    vgo_backoffice::init_routes();
    log_global_routes_info();

    // 命令行参数优先于配置
    let config = AppConfig {
        host: matches
            .get_one::<String>("host")
            .cloned()
            .unwrap_or_else(|| app_config.host.clone()),
        port: matches.get_one::<u16>("port").copied().unwrap_or(app_config.port),
        workers: matches.get_one::<usize>("workers").copied().or(app_config.workers),
    };

    AppBootstrap::new()
        .with_config(config)
        .run(app_config, memory)
        .await?;
    Ok(())
}
