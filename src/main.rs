//! Failbox - failure ledger CLI
//!
//! Inspects, requeues and purges failed jobs recorded by job workers.

mod cli;
mod cmd_failures;

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use failbox_config::{failbox_dir, ConfigLoader, ConfigValidator, LoggingConfig};
use failbox_ledger::FailureLedger;

use crate::cli::Cli;
use crate::cmd_failures::handle_command;

/// Initialize tracing with console and optional file output.
///
/// Console output goes to stderr so command output on stdout stays clean.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let file = if logging.file {
        let log_dir = logging.resolved_directory();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("failbox")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the writer alive for the program duration
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| failbox_dir().join("config.toml"));
    let mut config = ConfigLoader::load_or_default(&config_path)?;
    if let Some(store) = cli.store {
        config.store.path = Some(PathBuf::from(ConfigLoader::expand_path(&store.to_string_lossy())));
    }

    init_tracing(&config.logging)?;
    debug!("Using configuration from {}", config_path.display());

    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!("{}: {}", warning.path, warning.message);
    }

    let ledger = FailureLedger::open(&config).await?;
    handle_command(cli.command, &ledger).await
}
