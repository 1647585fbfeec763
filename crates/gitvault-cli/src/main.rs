//! gitvault: inspect and restore an encrypted backup repository
//!
//! Commands:
//!   init            - create the repository, salt and empty ledger
//!   status          - show the daemon's last reported status
//!   ls              - list tracked files (decrypts the ledger)
//!   restore <dest>  - decrypt every tracked file into <dest>
//!   config show     - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitvault_core::config::GitvaultConfig;
use gitvault_crypto::EncryptionKey;
use gitvault_sync::restore::restore_all;
use gitvault_sync::status::now_unix;
use gitvault_sync::{GitBackend, MetadataLedger, RepoLayout, SyncStatus, VcsError, VersionControl};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "gitvault",
    version,
    about = "Encrypted git backup client",
    long_about = "gitvault: initialize, inspect and restore repositories written by gitvaultd"
)]
struct Cli {
    /// Path to gitvault.toml configuration file
    #[arg(long, short = 'c', env = "GITVAULT_CONFIG", default_value = "gitvault.toml")]
    config: PathBuf,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "GITVAULT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the repository, salt and empty ledger, and make the first commit
    Init,

    /// Show the status last written by gitvaultd
    Status {
        /// Print the raw status JSON
        #[arg(long)]
        json: bool,
    },

    /// List tracked files
    Ls,

    /// Decrypt every tracked file into a directory
    Restore {
        /// Destination directory (created if missing)
        dest: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + file + environment)
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = GitvaultConfig::load(&cli.config)?;
    debug!(config = %cli.config.display(), repo = %config.repo.path.display(), "configuration loaded");

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Status { json } => cmd_status(&config, json),
        Commands::Ls => cmd_ls(&config),
        Commands::Restore { dest } => cmd_restore(&config, &dest),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── `gitvault init` ───────────────────────────────────────────────────────────

fn cmd_init(config: &GitvaultConfig) -> Result<()> {
    config.validate()?;
    let repo = &config.repo.path;
    std::fs::create_dir_all(repo)
        .with_context(|| format!("creating repository {}", repo.display()))?;
    let layout = RepoLayout::new(repo);

    let git = GitBackend::new();
    let created = git
        .init_repo(repo, &config.repo.branch)
        .context("initializing repository")?;
    if let Some(url) = &config.repo.remote_url {
        git.ensure_remote(repo, &config.repo.remote_name, url)
            .context("configuring remote")?;
        debug!(remote = %config.repo.remote_name, "remote configured");
    }

    let passphrase = gitvault_core::passphrase::obtain(config, "new passphrase: ")?;
    let key = layout.unlock(&passphrase)?;
    let ledger = MetadataLedger::load(&layout.ledger_path(), &key)
        .context("existing ledger does not open with this passphrase")?;
    if !layout.ledger_path().exists() {
        ledger.save(&layout.ledger_path(), &key)?;
        info!(path = %layout.ledger_path().display(), "created empty ledger");
    }

    match git.stage_and_commit(repo, "Initialize encrypted repository") {
        Ok(()) | Err(VcsError::NothingToCommit) => {}
        Err(e) => return Err(e).context("initial commit"),
    }

    println!(
        "{} repository at {}",
        if created { "Initialized" } else { "Reinitialized" },
        repo.display()
    );
    println!("  watch path: {}", config.repo.watch_path.display());
    println!("  tracked:    {} files", ledger.len());
    match &config.repo.remote_url {
        Some(url) => println!("  remote:     {} ({url})", config.repo.remote_name),
        None => println!("  remote:     none (commits stay local)"),
    }
    Ok(())
}

// ── `gitvault status` ─────────────────────────────────────────────────────────

fn cmd_status(config: &GitvaultConfig, json: bool) -> Result<()> {
    let layout = RepoLayout::new(&config.repo.path);
    let path = layout.status_path();
    if !path.exists() {
        anyhow::bail!(
            "no status at {} (has gitvaultd run? try: gitvaultd --config gitvault.toml)",
            path.display()
        );
    }
    let status = SyncStatus::load(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let now = now_unix();
    println!("gitvault status ({})", layout.root().display());
    println!(
        "  watcher:       {}",
        if status.watcher_running { "running" } else { "stopped" }
    );
    println!("  pending:       {} files", status.files_pending);
    match (&status.last_commit_hash, status.last_commit_time) {
        (Some(hash), Some(at)) => println!(
            "  last commit:   {} ({})",
            &hash[..12.min(hash.len())],
            fmt_ago(now, at)
        ),
        (Some(hash), None) => println!("  last commit:   {hash}"),
        _ => println!("  last commit:   never"),
    }
    match (config.repo.remote_url.as_deref(), status.last_push_time) {
        (None, _) => println!("  last push:     no remote configured"),
        (Some(_), Some(at)) => println!(
            "  last push:     {} ({})",
            if status.last_push_successful { "ok" } else { "FAILED" },
            fmt_ago(now, at)
        ),
        (Some(_), None) if status.last_push_successful => println!("  last push:     ok"),
        (Some(_), None) => println!("  last push:     not yet successful"),
    }
    Ok(())
}

// ── `gitvault ls` ─────────────────────────────────────────────────────────────

fn cmd_ls(config: &GitvaultConfig) -> Result<()> {
    let (_, _, ledger) = open(config)?;

    let mut records: Vec<_> = ledger.records().collect();
    records.sort_by(|a, b| a.original_path.cmp(&b.original_path));
    for record in &records {
        println!(
            "{:>10}  {:<16}  {}",
            fmt_bytes(record.file_size),
            &record.encrypted_name[..16.min(record.encrypted_name.len())],
            record.original_path
        );
    }
    println!();
    println!(
        "{} files, {}",
        records.len(),
        fmt_bytes(records.iter().map(|r| r.file_size).sum())
    );
    Ok(())
}

// ── `gitvault restore` ────────────────────────────────────────────────────────

fn cmd_restore(config: &GitvaultConfig, dest: &Path) -> Result<()> {
    let (layout, key, ledger) = open(config)?;

    info!(files = ledger.len(), dest = %dest.display(), "restoring");
    let report = restore_all(&layout, &key, &ledger, dest)?;
    println!("Restored {} files into {}", report.restored, dest.display());
    if !report.is_complete() {
        for (path, reason) in &report.failed {
            eprintln!("  failed: {path}: {reason}");
        }
        anyhow::bail!("{} files could not be restored", report.failed.len());
    }
    Ok(())
}

// ── `gitvault config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &GitvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn unlock(config: &GitvaultConfig, layout: &RepoLayout) -> Result<EncryptionKey> {
    if !layout.salt_path().exists() {
        anyhow::bail!(
            "{} is not an initialized repository (run `gitvault init`)",
            layout.root().display()
        );
    }
    let passphrase = gitvault_core::passphrase::obtain(config, "passphrase: ")?;
    let key = layout.unlock(&passphrase)?;
    debug!(repo = %layout.root().display(), "key derived");
    Ok(key)
}

/// Unlock the repository and decrypt its ledger.
fn open(config: &GitvaultConfig) -> Result<(RepoLayout, EncryptionKey, MetadataLedger)> {
    let layout = RepoLayout::new(&config.repo.path);
    let key = unlock(config, &layout)?;
    let ledger = MetadataLedger::load(&layout.ledger_path(), &key)
        .context("loading ledger (check the passphrase)")?;
    debug!(records = ledger.len(), "ledger loaded");
    Ok((layout, key, ledger))
}

fn fmt_ago(now: u64, then: u64) -> String {
    let secs = now.saturating_sub(then);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
