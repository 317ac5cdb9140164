use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{Layer, Registry};

use crate::common::config::LoggingConfigLoader;
use crate::common::get_logger_timer_rfc3339;

const DEFAULT_LOG_FILE: &str = "search-rpc.log";

fn parse_level(level: Option<String>) -> Result<LevelFilter, anyhow::Error> {
    match level {
        Some(s) => s
            .parse()
            .with_context(|| format!("invalid log level: {}", s)),
        None => Ok(LevelFilter::OFF),
    }
}

fn parse_env_filter(default_level: LevelFilter) -> Result<EnvFilter, anyhow::Error> {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env()
        .with_context(|| "failed to create env filter")
}

/// Install the global subscriber: a console layer on stderr and, when configured, a file layer.
///
/// The returned guard flushes the file writer when dropped; keep it alive for the process lifetime.
pub fn init(config: impl LoggingConfigLoader) -> Result<Option<WorkerGuard>, anyhow::Error> {
    let file_config = config.get_file_logger_config();
    let file_level = parse_level(file_config.level)?;

    // logger to a file
    let mut guard = None;
    let mut file_layer = None;
    if file_level != LevelFilter::OFF {
        let dir = file_config.dir.as_deref().unwrap_or(".");
        let file = file_config.file.as_deref().unwrap_or(DEFAULT_LOG_FILE);
        let file_appender = tracing_appender::rolling::never(dir, file);
        let (writer, g) = tracing_appender::non_blocking(file_appender);
        guard = Some(g);

        let mut l = tracing_subscriber::fmt::layer();
        l.set_ansi(false);
        file_layer = Some(
            l.with_writer(writer)
                .with_timer(get_logger_timer_rfc3339())
                .with_filter(parse_env_filter(file_level)?),
        );
    }

    // logger to console
    let console_level = parse_level(config.get_console_logger_config().level)?;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(get_logger_timer_rfc3339())
        .with_writer(std::io::stderr)
        .with_filter(parse_env_filter(console_level)?);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .with_context(|| "failed to install global logger")?;

    Ok(guard)
}
