//! gitvaultd: encrypted, version-controlled backup daemon
//!
//! Usage:
//!   gitvaultd [--config ./gitvault.toml] [--log info] [--log-format text|json]
//!
//! Watches `repo.watch_path`, encrypts every change into `repo.path`, and
//! commits (and optionally pushes) once the tree has been quiet for
//! `daemon.quiescence_ms`.

mod daemon;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gitvaultd", version, about = "Encrypted git backup daemon")]
struct Cli {
    /// Path to gitvault.toml configuration file
    #[arg(long, short = 'c', env = "GITVAULT_CONFIG", default_value = "gitvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides daemon.log_level
    #[arg(long, env = "GITVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides daemon.log_format
    #[arg(long, env = "GITVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = gitvault_core::config::GitvaultConfig::load(&cli.config)?;

    let level = cli.log.unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.unwrap_or(match config.daemon.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "gitvaultd starting"
    );
    if !cli.config.exists() {
        tracing::warn!(
            "config file not found: {}  (using defaults and environment)",
            cli.config.display()
        );
    }

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
