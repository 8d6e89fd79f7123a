use anyhow::Result;
use chrono::{Datelike, Timelike};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

struct LogTimer;

impl fmt::time::FormatTime for LogTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        let cs = now.timestamp_subsec_millis() / 10;
        let s = format!(
            "{:04}-{:02}-{:02}:{:02}:{:02}:{:02}:{:02}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            cs
        );
        w.write_str(&s)
    }
}

/// 日志输出格式 / Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" | "" => Some(LogFormat::Compact),
            "json" | "bunyan" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// 初始化全局日志订阅者（重复调用无副作用）
/// Install the global subscriber; repeated calls are no-ops.
///
/// RUST_LOG 优先，否则使用 `default_level` / RUST_LOG wins over `default_level`.
pub fn init_tracing(service_name: &str, default_level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    LogTracer::init().ok();

    match format {
        LogFormat::Json => {
            let formatting_layer = BunyanFormattingLayer::new(service_name.into(), std::io::stdout);
            let subscriber = Registry::default()
                .with(filter)
                .with(JsonStorageLayer)
                .with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        LogFormat::Compact => {
            fmt::SubscriberBuilder::default()
                .with_env_filter(filter)
                .with_timer(LogTimer)
                .compact()
                .with_target(false)
                .try_init()
                .ok();
        }
    }
    Ok(())
}
