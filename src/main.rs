mod cli;
mod repl;

use std::path::Path;

use color_eyre::eyre::{eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use chatgusto::config::AppConfig;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_args();
    let (config, config_path) = AppConfig::resolve(cli.config.as_deref())?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    let _log_guard = init_logging(&log_level, config.general.log_file.as_deref())?;
    tracing::debug!(path = %config_path.display(), "Configuration resolved");

    let api_key = repl::require_api_key(cli.api_key.clone())?;
    let mode = repl::initial_mode(cli.mode, &config);
    let thinking = cli.thinking || config.session.thinking;

    tracing::info!(%mode, thinking, model = %config.models.chat_model, "Starting chatgusto");
    repl::Repl::build(&config, api_key, mode, thinking)?.run().await
}

/// stderr by default, or a plain-text file when `log_file` is set
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| eyre!("log_file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}
